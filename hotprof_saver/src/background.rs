//! Background save task
//!
//! Runs save cycles on a timer or when woken through
//! [`ProfileSaver::request_save`], until stopped. Stopping performs one final
//! forced save.

use crate::saver::{ProfileSaver, SaveReason};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Handle to a running background saver
pub struct SaverTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SaverTask {
    /// Spawn the task on the current tokio runtime
    pub fn spawn(saver: Arc<ProfileSaver>) -> Self {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(saver, shutdown_rx));
        Self {
            shutdown: Some(shutdown),
            handle,
        }
    }

    /// Stop the task and wait for its final save
    pub async fn stop(self) {
        let Self { shutdown, handle } = self;
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        if let Err(e) = handle.await {
            tracing::warn!("Background profile saver ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run(saver: Arc<ProfileSaver>, mut shutdown: oneshot::Receiver<()>) {
    let mut interval = time::interval(saver.config().save_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    tracing::debug!(
        "Background profile saver started, period {:?}",
        saver.config().save_period()
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
            _ = saver.wakeup().notified() => {}
        }
        run_bounded(&saver, SaveReason::Periodic).await;
    }

    run_bounded(&saver, SaveReason::Shutdown).await;
    tracing::debug!("Background profile saver stopped");
}

/// Run one cycle off the async threads, giving up after the configured timeout
async fn run_bounded(saver: &Arc<ProfileSaver>, reason: SaveReason) {
    let timeout = saver.config().save_timeout();
    let cycle_saver = Arc::clone(saver);
    let cycle = tokio::task::spawn_blocking(move || cycle_saver.run_cycle(reason));

    match time::timeout(timeout, cycle).await {
        Ok(Ok(summary)) => {
            tracing::debug!(
                "{:?} save cycle: {} written, {} skipped, {} failed",
                reason,
                summary.written,
                summary.skipped,
                summary.failed
            );
        }
        Ok(Err(e)) => {
            tracing::warn!("{:?} save cycle aborted: {}", reason, e);
        }
        Err(_) => {
            saver.stats().record_timeout();
            tracing::warn!("{:?} save cycle exceeded {:?}", reason, timeout);
        }
    }
}
