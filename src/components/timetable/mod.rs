//! Timetable ingestion: fetch a schedule, parse it, keep the last good
//! snapshot and present upcoming events grouped by day.

mod actor;
pub mod fetcher;
mod handle;
pub mod models;
pub mod normalize;
pub mod parser;
mod persistence;
mod scheduler;
pub mod session;

pub use fetcher::{DateWindow, FetchedSource, HttpFetcher, ScheduleSource, SourceRequest};
pub use handle::TimetableHandle;
pub use models::{Advisory, DayKey, GroupedView, ScheduleEvent, ScheduleSnapshot, SourceKind};
pub use scheduler::RefreshScheduler;
pub use session::{IngestOutcome, SessionSettings, SessionStatus};

use super::redis_service::RedisActorHandle;
use crate::config::Config;
use crate::error::DashResult;
use crate::utils::scheduler::Scheduler;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

/// Timetable component backed by the Redis store
#[derive(Default)]
pub struct Timetable {
    handle: RwLock<Option<TimetableHandle>>,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

impl Timetable {
    /// Create a new Timetable component
    pub fn new() -> Self {
        Self {
            handle: RwLock::new(None),
            scheduler: Mutex::new(None),
        }
    }

    /// Get the handle if it exists
    pub async fn get_handle(&self) -> Option<TimetableHandle> {
        let handle_lock = self.handle.read().await;
        handle_lock.clone()
    }
}

#[async_trait]
impl super::Component for Timetable {
    fn name(&self) -> &'static str {
        "timetable"
    }

    async fn init(
        &self,
        config: Arc<RwLock<Config>>,
        redis_handle: RedisActorHandle,
    ) -> DashResult<()> {
        // Create a new handle if one doesn't exist
        let handle = {
            let mut handle_lock = self.handle.write().await;
            match &*handle_lock {
                Some(handle) => handle.clone(),
                None => {
                    let handle =
                        TimetableHandle::new(&*config.read().await, Arc::new(redis_handle))?;
                    *handle_lock = Some(handle.clone());
                    handle
                }
            }
        };

        if handle.restore().await? {
            info!("Timetable restored from cache");
        }

        // Start the refresh scheduler only if it hasn't been started yet
        let mut scheduler_lock = self.scheduler.lock().await;
        if scheduler_lock.is_none() {
            match RefreshScheduler::start(config, handle).await {
                Ok(scheduler) => *scheduler_lock = Some(scheduler),
                Err(e) => error!("Failed to start timetable scheduler: {}", e),
            }
        }

        Ok(())
    }

    async fn shutdown(&self) -> DashResult<()> {
        // Stop the scheduler before the actor it talks to
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await?;
        }

        let handle_lock = self.handle.read().await;
        if let Some(handle) = &*handle_lock {
            handle.shutdown().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
