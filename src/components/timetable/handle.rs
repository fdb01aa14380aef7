use super::actor::{TimetableActor, TimetableActorHandle};
use super::fetcher::{DateWindow, HttpFetcher, ScheduleSource, SourceRequest};
use super::models::{Advisory, GroupedView, ScheduleSnapshot};
use super::session::{IngestOutcome, SessionSettings, SessionStatus, TimetableSession};
use crate::components::redis_service::KeyValueStore;
use crate::config::Config;
use crate::error::DashResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle for interacting with the timetable actor
#[derive(Clone)]
pub struct TimetableHandle {
    actor_handle: TimetableActorHandle,
    cancel: CancellationToken,
    _actor_task: Arc<JoinHandle<()>>,
}

impl TimetableHandle {
    /// Create a handle fetching over HTTP and spawn the actor
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> DashResult<Self> {
        let settings = SessionSettings::from_config(config)?;
        let source = Arc::new(HttpFetcher::new(config)?);
        Ok(Self::with_source(settings, source, store))
    }

    /// Create a handle over any schedule source and spawn the actor
    pub fn with_source(
        settings: SessionSettings,
        source: Arc<dyn ScheduleSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let session = TimetableSession::new(settings, source, store, cancel.clone());

        // Create the actor and get its handle
        let (mut actor, handle) = TimetableActor::new(session);

        // Spawn a task to run the actor
        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            cancel,
            _actor_task: Arc::new(actor_task),
        }
    }

    /// Load the cached snapshot, returning whether one was found
    pub async fn restore(&self) -> DashResult<bool> {
        self.actor_handle.restore().await
    }

    /// Ingest calendar text supplied by the user
    pub async fn upload_file(&self, content: impl Into<String>) -> DashResult<IngestOutcome> {
        self.actor_handle
            .ingest(SourceRequest::File {
                content: content.into(),
            })
            .await
    }

    /// Re-fetch the timetable file served by the host application
    pub async fn refresh_static(&self) -> DashResult<IngestOutcome> {
        self.actor_handle.ingest(SourceRequest::StaticEndpoint).await
    }

    /// Poll the static endpoint unless auto-refresh is off or another source owns the snapshot
    pub async fn poll_static(&self) -> DashResult<Option<IngestOutcome>> {
        self.actor_handle.poll_static().await
    }

    /// Fetch the export for an identifier, by default for the next two weeks
    pub async fn fetch_for_identifier(
        &self,
        identifier: &str,
        window: Option<DateWindow>,
    ) -> DashResult<IngestOutcome> {
        self.actor_handle
            .ingest(SourceRequest::Identifier {
                identifier: identifier.to_string(),
                window,
            })
            .await
    }

    pub async fn remembered_identifier(&self) -> DashResult<Option<String>> {
        self.actor_handle.remembered_identifier().await
    }

    pub async fn snapshot(&self) -> DashResult<Option<Arc<ScheduleSnapshot>>> {
        self.actor_handle.snapshot().await
    }

    pub async fn grouped_view(&self, now: DateTime<Utc>) -> DashResult<GroupedView> {
        self.actor_handle.grouped_view(now).await
    }

    pub async fn check_staleness(&self, now: DateTime<Utc>) -> DashResult<Option<Advisory>> {
        self.actor_handle.check_staleness(now).await
    }

    pub async fn status(&self) -> DashResult<SessionStatus> {
        self.actor_handle.status().await
    }

    pub async fn dismiss_advisory(&self) -> DashResult<bool> {
        self.actor_handle.dismiss_advisory().await
    }

    pub async fn set_auto_refresh(&self, enabled: bool) -> DashResult<()> {
        self.actor_handle.set_auto_refresh(enabled).await
    }

    /// Abandon in-flight work and shutdown the actor
    pub async fn shutdown(&self) -> DashResult<()> {
        self.cancel.cancel();
        self.actor_handle.shutdown().await
    }
}
