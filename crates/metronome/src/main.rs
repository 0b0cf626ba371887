use std::env;
use std::fs;
use std::io::{self, IsTerminal as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use directories::BaseDirs;
use metronome::client;
use metronome::console::{ConsoleWindow as _, PlatformConsole};
use metronome::control::{self, ControlOptions, Directive, Invocation};
use metronome::jobs;
use metronome::server::{self, ServerHandle};
use metronome_core::channel::{ChannelPaths, ClaimError};
use metronome_core::config::ConfigFile;
use metronome_core::message::{ControlMessage, ServerEvent};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let raw_args: Vec<String> = env::args().skip(1).collect();
    let opts = resolve_options()?;
    let invocation = control::prepare(&opts, &raw_args);

    let (config, config_warning) = load_config(&invocation.paths.config_file);
    init_logging(&invocation.paths, config.log_level.as_deref())?;
    if let Some(warning) = &config_warning {
        tracing::warn!("{warning}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        channel = %invocation.paths.name,
        "metronome starting"
    );
    tracing::debug!(
        args = ?invocation.raw_args,
        parsed = %invocation.args.to_line(),
        "invocation"
    );

    match &invocation.directive {
        Directive::Help => {
            print_usage();
            Ok(())
        }
        Directive::Serve => serve(&invocation, &config).await,
        Directive::ServeUnlessRunning => serve_unless_running(&opts, &invocation, &config).await,
        Directive::Dispatch { messages } => dispatch(&opts, &invocation, &config, messages).await,
        Directive::NothingToDo => {
            println!("nothing to do; run with -help for the control options");
            Ok(())
        }
    }
}

/// The bare interactive invocation: a live listener means there is nothing
/// to start, otherwise this process becomes the instance.
async fn serve_unless_running(
    opts: &ControlOptions,
    invocation: &Invocation,
    config: &ConfigFile,
) -> anyhow::Result<()> {
    if client::probe(&invocation.paths, opts.connect_timeout).await {
        println!("already running on channel {}", invocation.paths.name);
        println!("run with -help for the control options");
        return Ok(());
    }
    serve(invocation, config).await
}

/// The forwarding path: send each message, report it, and fall back to
/// serving when a command found no listener.
async fn dispatch(
    opts: &ControlOptions,
    invocation: &Invocation,
    config: &ConfigFile,
    messages: &[ControlMessage],
) -> anyhow::Result<()> {
    let report = control::dispatch(&invocation.paths, messages, opts.connect_timeout).await?;
    for message in &report.sent {
        println!("sent {message}");
    }
    if !report.no_listener {
        return Ok(());
    }

    println!("no running instance on channel {}", invocation.paths.name);

    // A forwarded command with nobody to take it starts an instance to take
    // it, unless this invocation also asked for a stop.
    if invocation.intent.command_text.is_some() && !invocation.intent.stop {
        tracing::info!("no listener, serving instead");
        return serve(invocation, config).await;
    }
    Ok(())
}

async fn serve(invocation: &Invocation, config: &ConfigFile) -> anyhow::Result<()> {
    let console = PlatformConsole;
    if invocation.intent.hidden {
        console.hide();
    }

    let server = match server::claim(&invocation.paths).await {
        Ok(server) => server,
        Err(ClaimError::AlreadyRunning { name }) => {
            println!("already running on channel {name}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let scheduler = jobs::start(&config.effective_jobs());
    tokio::spawn(shutdown_signal_watcher(server.handle()));

    println!("ready");
    server
        .run(|event| handle_event(event, &scheduler, &console))
        .await;

    scheduler.shutdown().await;
    tracing::info!("metronome stopped");
    Ok(())
}

fn handle_event(event: ServerEvent, scheduler: &jobs::Scheduler, console: &PlatformConsole) {
    match event {
        ServerEvent::Show => {
            tracing::info!("show requested");
            console.show();
        }
        ServerEvent::Hidden => {
            tracing::info!("hide requested");
            console.hide();
        }
        ServerEvent::Stop => {
            tracing::info!("stop requested");
        }
        ServerEvent::Pause => scheduler.pause_all(),
        ServerEvent::Continue => scheduler.resume_all(),
        ServerEvent::Command { text, args } => {
            tracing::info!(command = %text, options = %args.to_line(), "command received");
            println!("command received: {text}");
        }
    }
}

fn resolve_options() -> anyhow::Result<ControlOptions> {
    let exe = env::current_exe().context("resolve current executable")?;
    let binary_dir = exe
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("executable path has no directory"))?;

    let base_dir = match env::var_os("METRONOME_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dirs =
                BaseDirs::new().ok_or_else(|| anyhow!("could not determine home directory"))?;
            base_dirs.home_dir().join(".metronome")
        }
    };

    let connect_timeout = match env::var("METRONOME_CONNECT_TIMEOUT_MS") {
        Ok(raw) => {
            let millis: u64 = raw
                .trim()
                .parse()
                .context("parse METRONOME_CONNECT_TIMEOUT_MS")?;
            Duration::from_millis(millis)
        }
        Err(_) => client::DEFAULT_CONNECT_TIMEOUT,
    };

    Ok(ControlOptions {
        binary_dir,
        interactive: io::stdin().is_terminal(),
        base_dir,
        connect_timeout,
    })
}

/// Read once at startup. Problems are remembered and reported after logging
/// comes up; they never stop the program.
fn load_config(config_file: &Path) -> (ConfigFile, Option<String>) {
    let raw = match fs::read_to_string(config_file) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return (ConfigFile::default(), None);
        }
        Err(err) => {
            return (
                ConfigFile::default(),
                Some(format!("cannot read {}: {err}", config_file.display())),
            );
        }
    };

    match ConfigFile::parse(&raw) {
        Ok(config) => (config, None),
        Err(err) => (
            ConfigFile::default(),
            Some(format!("invalid config {}: {err}", config_file.display())),
        ),
    }
}

fn init_logging(paths: &ChannelPaths, config_level: Option<&str>) -> anyhow::Result<()> {
    let dir_ok = fs::create_dir_all(&paths.base_dir).is_ok();

    let level = env::var("METRONOME_LOG")
        .ok()
        .or_else(|| env::var("RUST_LOG").ok())
        .or_else(|| config_level.map(str::to_owned))
        .unwrap_or_else(|| "info".to_owned());

    let filter = EnvFilter::try_new(level).context("parse log level")?;

    let file_layer = if dir_ok {
        tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::NEVER)
            .filename_prefix("metronome")
            .filename_suffix("log")
            .build(&paths.base_dir)
            .ok()
            .map(|file_appender| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_appender)
            })
    } else {
        None
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

fn print_usage() {
    println!("metronome {}", env!("CARGO_PKG_VERSION"));
    println!("single-instance scheduler; a second invocation controls the first");
    println!();
    println!("  -help             show this help (also: ?)");
    println!("  -start, -run      run the scheduler in this console");
    println!("  -stop, -exit      stop the running instance");
    println!("  -pause            pause all jobs");
    println!("  -continue         resume paused jobs");
    println!("  -show             show the instance's console window");
    println!("  -hidden, -hide    hide it; with -start, start hidden");
    println!("  -command 'TEXT'   forward a command line to the instance");
    println!("  -name NAME        address the named instance");
    println!();

    // Usage stays on screen until acknowledged; EOF satisfies the wait.
    print!("press Enter to exit");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
}

async fn shutdown_signal_watcher(handle: ServerHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).ok();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async { if let Some(s) = sigterm.as_mut() { s.recv().await; } } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    handle.request_shutdown();
}
