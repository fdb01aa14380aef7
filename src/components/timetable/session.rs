use super::fetcher::{ScheduleSource, SourceRequest};
use super::models::{Advisory, GroupedView, ScheduleSnapshot, SourceKind};
use super::normalize::{group_by_day, staleness};
use super::parser::parse;
use super::persistence;
use crate::components::redis_service::KeyValueStore;
use crate::config::Config;
use crate::error::{DashResult, Error};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settings a session needs from the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub tz: Tz,
    pub stale_after: Duration,
    pub auto_refresh: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> DashResult<Self> {
        Ok(Self {
            tz: config.tz()?,
            stale_after: Duration::hours(config.stale_after_hours),
            auto_refresh: config.auto_refresh,
        })
    }
}

/// Result of one ingestion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new snapshot replaced the previous one
    Installed { events: usize },
    /// The session was torn down before the snapshot could be installed
    Discarded,
    /// An identical request finished just before this one was due
    Coalesced,
}

/// Summary of the session for display
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub events: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub source: Option<SourceKind>,
    pub advisory: Option<Advisory>,
    pub auto_refresh: bool,
}

/// Owns the current snapshot and everything needed to replace it
pub struct TimetableSession {
    settings: SessionSettings,
    source: Arc<dyn ScheduleSource>,
    store: Arc<dyn KeyValueStore>,
    current: Option<Arc<ScheduleSnapshot>>,
    advisory: Option<Advisory>,
    cancel: CancellationToken,
}

impl TimetableSession {
    pub fn new(
        settings: SessionSettings,
        source: Arc<dyn ScheduleSource>,
        store: Arc<dyn KeyValueStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            source,
            store,
            current: None,
            advisory: None,
            cancel,
        }
    }

    /// Load the cached snapshot, returning whether one was found
    pub async fn restore(&mut self) -> bool {
        match persistence::load_snapshot(self.store.as_ref()).await {
            Some(snapshot) => {
                info!(
                    events = snapshot.len(),
                    fetched_at = %snapshot.fetched_at(),
                    "Restored cached timetable"
                );
                self.current = Some(Arc::new(snapshot));
                true
            }
            None => {
                debug!("No cached timetable to restore");
                false
            }
        }
    }

    /// Fetch, parse and install a new snapshot.
    ///
    /// On failure the previous snapshot stays and an advisory is raised.
    pub async fn ingest(
        &mut self,
        request: &SourceRequest,
        now: DateTime<Utc>,
    ) -> DashResult<IngestOutcome> {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Timetable fetch abandoned");
                return Ok(IngestOutcome::Discarded);
            }
            result = self.source.fetch(request) => result,
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };

        let events = match parse(&fetched.body, fetched.format, self.settings.tz) {
            Ok(events) => events,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };

        if self.cancel.is_cancelled() {
            debug!("Discarding parsed timetable after teardown");
            return Ok(IngestOutcome::Discarded);
        }

        let snapshot = ScheduleSnapshot::new(
            events,
            fetched.last_modified.unwrap_or(now),
            request.kind(),
        );
        let count = snapshot.len();

        if let Err(e) = persistence::save_snapshot(self.store.as_ref(), &snapshot).await {
            warn!("Failed to cache timetable: {}", e);
        }

        if let SourceRequest::Identifier { identifier, .. } = request {
            if let Err(e) = persistence::save_identifier(self.store.as_ref(), identifier.trim()).await {
                warn!("Failed to remember timetable identifier: {}", e);
            }
        }

        self.current = Some(Arc::new(snapshot));
        self.advisory = None;

        info!(events = count, source = ?request.kind(), "Installed timetable snapshot");
        Ok(IngestOutcome::Installed { events: count })
    }

    fn record_failure(&mut self, error: &Error) {
        let advisory = match error {
            Error::NotFound(_) => Advisory::NotConfigured,
            Error::Network(cause) => Advisory::NetworkError(cause.clone()),
            other => Advisory::Error(other.to_string()),
        };

        warn!("Timetable ingestion failed: {}", error);
        self.advisory = Some(advisory);
    }

    pub async fn upload_file(&mut self, content: String, now: DateTime<Utc>) -> DashResult<IngestOutcome> {
        self.ingest(&SourceRequest::File { content }, now).await
    }

    pub async fn refresh_static(&mut self, now: DateTime<Utc>) -> DashResult<IngestOutcome> {
        self.ingest(&SourceRequest::StaticEndpoint, now).await
    }

    /// Refresh from the static endpoint on the recurring poll.
    ///
    /// Returns `None` without fetching while auto-refresh is off or while
    /// the snapshot came from an upload or an identifier export.
    pub async fn poll_static(&mut self, now: DateTime<Utc>) -> DashResult<Option<IngestOutcome>> {
        if !self.settings.auto_refresh {
            return Ok(None);
        }

        if let Some(snapshot) = &self.current {
            if snapshot.source() != SourceKind::StaticEndpoint {
                debug!(source = ?snapshot.source(), "Snapshot not from static endpoint, skipping poll");
                return Ok(None);
            }
        }

        self.ingest(&SourceRequest::StaticEndpoint, now).await.map(Some)
    }

    pub async fn fetch_for_identifier(
        &mut self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> DashResult<IngestOutcome> {
        let request = SourceRequest::Identifier {
            identifier: identifier.to_string(),
            window: None,
        };
        self.ingest(&request, now).await
    }

    /// Identifier of the last successful export fetch
    pub async fn remembered_identifier(&self) -> DashResult<Option<String>> {
        persistence::load_identifier(self.store.as_ref()).await
    }

    pub fn snapshot(&self) -> Option<Arc<ScheduleSnapshot>> {
        self.current.clone()
    }

    /// Upcoming events of the current snapshot grouped by day
    pub fn grouped_view(&self, now: DateTime<Utc>) -> GroupedView {
        self.current
            .as_ref()
            .map(|snapshot| group_by_day(snapshot.events(), now, self.settings.tz))
            .unwrap_or_default()
    }

    /// Raise a staleness advisory if the snapshot is too old.
    ///
    /// Snapshots kept fresh by polling are never reported stale. A stale
    /// notice does not replace a pending failure notice.
    pub fn check_staleness(&mut self, now: DateTime<Utc>) -> Option<Advisory> {
        let snapshot = self.current.as_ref()?;
        if self.settings.auto_refresh && snapshot.source() == SourceKind::StaticEndpoint {
            return None;
        }

        let advisory = staleness(snapshot.fetched_at(), now, self.settings.stale_after)?;
        if matches!(self.advisory, None | Some(Advisory::Stale { .. })) {
            info!("Timetable is stale: {}", advisory);
            self.advisory = Some(advisory.clone());
        }

        Some(advisory)
    }

    pub fn advisory(&self) -> Option<&Advisory> {
        self.advisory.as_ref()
    }

    /// Clear the advisory if it may be dismissed, returning whether it was
    pub fn dismiss_advisory(&mut self) -> bool {
        match &self.advisory {
            Some(advisory) if advisory.is_dismissible() => {
                self.advisory = None;
                true
            }
            _ => false,
        }
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        info!("Timetable auto-refresh {}", if enabled { "enabled" } else { "disabled" });
        self.settings.auto_refresh = enabled;
    }

    pub fn auto_refresh(&self) -> bool {
        self.settings.auto_refresh
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            events: self.current.as_ref().map_or(0, |s| s.len()),
            fetched_at: self.current.as_ref().map(|s| s.fetched_at()),
            source: self.current.as_ref().map(|s| s.source()),
            advisory: self.advisory.clone(),
            auto_refresh: self.settings.auto_refresh,
        }
    }
}
