//! The demo workload: a handful of interval jobs that print a timestamped
//! line so pause/continue/stop have something visible to act on.

use std::time::Duration;

use metronome_core::config::JobConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One task per job, all sharing a pause flag and a shutdown flag.
pub struct Scheduler {
    pause_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

pub fn start(jobs: &[JobConfig]) -> Scheduler {
    let (pause_tx, _) = watch::channel(false);
    let (shutdown_tx, _) = watch::channel(false);

    let mut tasks = Vec::with_capacity(jobs.len());
    for job in jobs {
        let job = job.clone();
        let pause_rx = pause_tx.subscribe();
        let shutdown_rx = shutdown_tx.subscribe();
        tracing::info!(
            job = %job.name,
            interval_secs = job.effective_interval_secs(),
            "job scheduled"
        );
        tasks.push(tokio::spawn(job_loop(job, pause_rx, shutdown_rx)));
    }

    Scheduler {
        pause_tx,
        shutdown_tx,
        tasks,
    }
}

async fn job_loop(
    job: JobConfig,
    pause_rx: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(job.effective_interval_secs()));
    // No catch-up burst after a pause.
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                if *pause_rx.borrow() {
                    continue;
                }
                println!("[{}] {}", job.name, timestamp());
            }
        }
    }
}

impl Scheduler {
    /// Paused jobs keep ticking silently; nothing is printed until resume.
    pub fn pause_all(&self) {
        let _ = self.pause_tx.send(true);
        tracing::info!("jobs paused");
    }

    pub fn resume_all(&self) {
        let _ = self.pause_tx.send(false);
        tracing::info!("jobs resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    /// Stops every job task, waiting briefly for each to wind down.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(3), task).await;
        }
        tracing::debug!("scheduler stopped");
    }
}

fn timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    let formatted = time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .ok()
        .and_then(|format| now.format(&format).ok());
    match formatted {
        Some(formatted) => formatted,
        None => now.unix_timestamp().to_string(),
    }
}
