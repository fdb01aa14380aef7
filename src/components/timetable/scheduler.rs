use super::handle::TimetableHandle;
use super::session::IngestOutcome;
use crate::config::Config;
use crate::error::{DashResult, Error};
use crate::utils::scheduler::Scheduler;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration as TokioDuration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Recurring static-endpoint poll and staleness check
pub struct RefreshScheduler {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Spawn both loops
    pub fn spawn(
        handle: TimetableHandle,
        poll_interval: TokioDuration,
        check_interval: TokioDuration,
    ) -> Self {
        let cancel = CancellationToken::new();

        info!(
            poll_secs = poll_interval.as_secs(),
            check_secs = check_interval.as_secs(),
            "Starting timetable refresh scheduler"
        );

        let tasks = vec![
            tokio::spawn(poll_loop(handle.clone(), poll_interval, cancel.clone())),
            tokio::spawn(staleness_loop(handle, check_interval, cancel.clone())),
        ];

        Self { cancel, tasks }
    }

    /// Cancel both loops and wait for them to finish
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Timetable scheduler task failed: {:?}", e);
            }
        }
    }
}

impl Scheduler for RefreshScheduler {
    type Handle = TimetableHandle;

    fn start(
        config: Arc<RwLock<Config>>,
        handle: Self::Handle,
    ) -> Pin<Box<dyn Future<Output = DashResult<Self>> + Send>> {
        Box::pin(async move {
            let config = config.read().await;
            let poll_interval = TokioDuration::from_secs(config.poll_interval);
            let check_interval = TokioDuration::from_secs(config.staleness_check_interval);
            drop(config);

            Ok(Self::spawn(handle, poll_interval, check_interval))
        })
    }

    fn stop(&mut self) -> Pin<Box<dyn Future<Output = DashResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.shutdown().await;
            Ok(())
        })
    }
}

async fn poll_loop(handle: TimetableHandle, interval: TokioDuration, cancel: CancellationToken) {
    loop {
        let keep_going = tokio::select! {
            _ = cancel.cancelled() => false,
            keep_going = poll_once(&handle) => keep_going,
        };
        if !keep_going {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    debug!("Timetable poll loop stopped");
}

/// Poll the static endpoint through the actor.
///
/// Returns `false` once the actor is gone.
async fn poll_once(handle: &TimetableHandle) -> bool {
    match handle.poll_static().await {
        Ok(Some(IngestOutcome::Installed { events })) => debug!(events, "Polled static timetable"),
        Ok(Some(_)) => {}
        Ok(None) => debug!("Static poll skipped"),
        // Nothing served yet is the normal state before the first upload
        Err(Error::NotFound(e)) => debug!("No static timetable: {}", e),
        Err(Error::Component(e)) => {
            error!("Timetable actor unavailable, stopping poll: {}", e);
            return false;
        }
        Err(e) => warn!("Failed to poll static timetable: {}", e),
    }

    true
}

async fn staleness_loop(handle: TimetableHandle, interval: TokioDuration, cancel: CancellationToken) {
    loop {
        if let Err(e) = handle.check_staleness(Utc::now()).await {
            error!("Timetable actor unavailable, stopping staleness check: {}", e);
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    debug!("Timetable staleness loop stopped");
}
