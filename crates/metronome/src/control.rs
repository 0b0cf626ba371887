//! Ties the pieces together: raw argv in, a channel address and a directive
//! out, plus the forwarding path for message-bearing invocations.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use metronome_core::args::{self, ParsedArgs};
use metronome_core::channel::{self, ChannelPaths};
use metronome_core::intent::{self, CommandIntent};
use metronome_core::message::ControlMessage;

use crate::client::{self, SendOutcome};

/// Facts about the hosting process the control layer needs. Collected once
/// by the binary; nothing below this point reads the environment.
#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub binary_dir: PathBuf,
    pub interactive: bool,
    pub base_dir: PathBuf,
    pub connect_timeout: Duration,
}

/// One fully interpreted invocation, raw arguments included.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub raw_args: Vec<String>,
    pub args: ParsedArgs,
    pub intent: CommandIntent,
    pub paths: ChannelPaths,
    pub directive: Directive,
}

/// What an invocation calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Help,
    Serve,
    /// The bare interactive invocation: report the running instance, or
    /// become it when nobody is listening.
    ServeUnlessRunning,
    Dispatch { messages: Vec<ControlMessage> },
    /// Options parsed fine but named no action. Reported, never served.
    NothingToDo,
}

pub fn prepare(opts: &ControlOptions, raw_args: &[String]) -> Invocation {
    let args = args::tokenize(raw_args);
    let intent = intent::interpret(&args, opts.interactive);
    let name = channel::channel_name(&opts.binary_dir, intent.instance_name.as_deref());
    let paths = channel::resolve_paths(&opts.base_dir, &name);
    let directive = directive_for(&intent, raw_args.is_empty(), opts.interactive);
    Invocation {
        raw_args: raw_args.to_vec(),
        args,
        intent,
        paths,
        directive,
    }
}

/// Help wins outright, then start, then the message flags. An invocation
/// carrying none of them may only serve implicitly when it was a bare
/// interactive one; a lone `-name` or a misspelled flag is a no-op.
fn directive_for(intent: &CommandIntent, no_args: bool, interactive: bool) -> Directive {
    if intent.help {
        return Directive::Help;
    }
    if intent.start {
        return Directive::Serve;
    }
    let messages = outbound_messages(intent);
    if !messages.is_empty() {
        return Directive::Dispatch { messages };
    }
    if no_args && interactive {
        return Directive::ServeUnlessRunning;
    }
    Directive::NothingToDo
}

/// Maps the message flags to their wire form in fixed order: show, hide,
/// then exactly one of the lifecycle trio (stop over pause over continue),
/// then the forwarded command text.
pub fn outbound_messages(intent: &CommandIntent) -> Vec<ControlMessage> {
    let mut messages = Vec::new();
    if intent.show {
        messages.push(ControlMessage::Show);
    }
    if intent.hidden {
        messages.push(ControlMessage::Hide);
    }
    if intent.stop {
        messages.push(ControlMessage::Stop);
    } else if intent.pause {
        messages.push(ControlMessage::Pause);
    } else if intent.resume {
        messages.push(ControlMessage::Continue);
    }
    if let Some(text) = &intent.command_text {
        messages.push(ControlMessage::Command(text.clone()));
    }
    messages
}

/// What came of forwarding one invocation's messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: Vec<ControlMessage>,
    /// Set when a send found nobody listening. The remaining messages were
    /// not attempted.
    pub no_listener: bool,
}

/// Sends the messages in order, each over its own connection. Stops at the
/// first send that finds no listener; later messages would meet the same
/// silence.
pub async fn dispatch(
    paths: &ChannelPaths,
    messages: &[ControlMessage],
    timeout: Duration,
) -> anyhow::Result<DispatchReport> {
    let mut sent = Vec::new();
    for message in messages {
        let outcome = client::send(paths, message, timeout)
            .await
            .with_context(|| format!("send {message} on channel {}", paths.name))?;
        match outcome {
            SendOutcome::Sent => sent.push(message.clone()),
            SendOutcome::NoListener => {
                tracing::info!(channel = %paths.name, "no listener on channel");
                return Ok(DispatchReport {
                    sent,
                    no_listener: true,
                });
            }
        }
    }
    Ok(DispatchReport {
        sent,
        no_listener: false,
    })
}
