use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deskboard::components::redis_service::{keys, KeyValueStore, MemoryStore};
use deskboard::components::timetable::session::TimetableSession;
use deskboard::components::timetable::{
    Advisory, FetchedSource, IngestOutcome, RefreshScheduler, ScheduleSource, SessionSettings,
    SourceKind, SourceRequest, TimetableHandle,
};
use deskboard::components::timetable::models::SourceFormat;
use deskboard::error::{network_error, other_error, DashResult, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

/// What the fake static endpoint answers with
enum StaticReply {
    Body(String, Option<DateTime<Utc>>),
    NotFound,
    Network,
}

/// Schedule source driven by the test instead of HTTP
struct FakeSource {
    static_reply: StaticReply,
    export_body: String,
    fetches: AtomicUsize,
    started: Notify,
    gate: Option<Semaphore>,
}

impl FakeSource {
    fn new(static_reply: StaticReply) -> Self {
        Self {
            static_reply,
            export_body: String::new(),
            fetches: AtomicUsize::new(0),
            started: Notify::new(),
            gate: None,
        }
    }

    /// Block every fetch until `open_gate` is called
    fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    fn with_export(mut self, body: &str) -> Self {
        self.export_body = body.to_string();
        self
    }

    fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduleSource for FakeSource {
    async fn fetch(&self, request: &SourceRequest) -> DashResult<FetchedSource> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| other_error(&e.to_string()))?;
        }

        match request {
            SourceRequest::File { content } => Ok(FetchedSource::from_file(content)),
            SourceRequest::StaticEndpoint => match &self.static_reply {
                StaticReply::Body(body, last_modified) => Ok(FetchedSource {
                    body: body.clone(),
                    format: SourceFormat::ICalendar,
                    last_modified: *last_modified,
                }),
                StaticReply::NotFound => Err(Error::NotFound("HTTP 404".to_string())),
                StaticReply::Network => Err(network_error("connection refused")),
            },
            SourceRequest::Identifier { .. } => Ok(FetchedSource {
                body: self.export_body.clone(),
                format: SourceFormat::Tabular,
                last_modified: None,
            }),
        }
    }
}

fn settings(auto_refresh: bool) -> SessionSettings {
    SessionSettings {
        tz: chrono_tz::UTC,
        stale_after: Duration::hours(24),
        auto_refresh,
    }
}

fn ics_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Calendar with one event per start instant
fn calendar(starts: &[(&str, DateTime<Utc>)]) -> String {
    let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n");
    for (title, start) in starts {
        text.push_str("BEGIN:VEVENT\r\n");
        text.push_str(&format!("DTSTART:{}\r\n", ics_stamp(*start)));
        text.push_str(&format!("DTEND:{}\r\n", ics_stamp(*start + Duration::minutes(90))));
        text.push_str(&format!("SUMMARY:{}\r\n", title));
        text.push_str("END:VEVENT\r\n");
    }
    text.push_str("END:VCALENDAR\r\n");
    text
}

fn two_lessons() -> String {
    let now = Utc::now();
    calendar(&[
        ("Databases", now + Duration::days(2)),
        ("Networks", now + Duration::days(1)),
    ])
}

fn handle_for(source: Arc<FakeSource>, store: &MemoryStore, auto_refresh: bool) -> TimetableHandle {
    TimetableHandle::with_source(settings(auto_refresh), source, Arc::new(store.clone()))
}

#[tokio::test]
async fn test_upload_installs_sorted_snapshot() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::NotFound));
    let handle = handle_for(source, &store, false);

    let outcome = handle.upload_file(two_lessons()).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Installed { events: 2 });

    let snapshot = handle.snapshot().await.unwrap().unwrap();
    let titles: Vec<_> = snapshot.events().iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Networks", "Databases"]);
    assert_eq!(snapshot.source(), SourceKind::File);

    // Cached for the next start
    assert!(store.get(keys::TIMETABLE_SNAPSHOT).await.unwrap().is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_ingestion_keeps_snapshot() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::Network));
    let handle = handle_for(Arc::clone(&source), &store, false);

    handle.upload_file(two_lessons()).await.unwrap();

    // Transport failure
    let err = handle.refresh_static().await.unwrap_err();
    assert!(err.is_retryable());
    let status = handle.status().await.unwrap();
    assert_eq!(status.events, 2);
    assert!(matches!(status.advisory, Some(Advisory::NetworkError(_))));
    assert!(handle.dismiss_advisory().await.unwrap());
    assert_eq!(handle.status().await.unwrap().advisory, None);

    // Malformed upload
    let err = handle.upload_file("this is not a calendar").await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    let status = handle.status().await.unwrap();
    assert_eq!(status.events, 2);
    assert!(matches!(status.advisory, Some(Advisory::Error(_))));

    // Hard errors cannot be dismissed
    assert!(!handle.dismiss_advisory().await.unwrap());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_static_not_found_keeps_cached_snapshot() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::NotFound));

    // Populate the cache from an earlier run
    let first = handle_for(Arc::clone(&source), &store, false);
    first.upload_file(two_lessons()).await.unwrap();
    first.shutdown().await.unwrap();

    let handle = handle_for(source, &store, false);
    assert!(handle.restore().await.unwrap());

    let err = handle.refresh_static().await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let status = handle.status().await.unwrap();
    assert_eq!(status.advisory, Some(Advisory::NotConfigured));
    assert_eq!(status.events, 2);
    assert!(handle.snapshot().await.unwrap().is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::NotFound));

    let first = handle_for(Arc::clone(&source), &store, false);
    first.upload_file(two_lessons()).await.unwrap();
    let saved = first.snapshot().await.unwrap().unwrap();
    first.shutdown().await.unwrap();

    let second = handle_for(source, &store, false);
    assert!(second.restore().await.unwrap());
    let restored = second.snapshot().await.unwrap().unwrap();

    assert_eq!(restored.events(), saved.events());
    assert_eq!(restored.fetched_at(), saved.fetched_at());

    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restore_without_cache() {
    let store = MemoryStore::new();
    let handle = handle_for(Arc::new(FakeSource::new(StaticReply::NotFound)), &store, false);

    assert!(!handle.restore().await.unwrap());
    assert!(handle.snapshot().await.unwrap().is_none());
    assert!(handle.grouped_view(Utc::now()).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_snapshot_cleared_by_refresh() {
    let store = MemoryStore::new();
    let last_modified = Utc::now() - Duration::hours(25);
    let source = Arc::new(FakeSource::new(StaticReply::Body(
        two_lessons(),
        Some(last_modified),
    )));
    let handle = handle_for(source, &store, false);

    handle.refresh_static().await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.fetched_at, Some(last_modified));

    let advisory = handle.check_staleness(Utc::now()).await.unwrap();
    assert!(matches!(advisory, Some(Advisory::Stale { age_hours: 25 })));
    assert_eq!(handle.status().await.unwrap().advisory, advisory);

    // A fresh upload replaces the snapshot and clears the notice
    handle.upload_file(two_lessons()).await.unwrap();
    assert_eq!(handle.status().await.unwrap().advisory, None);
    assert_eq!(handle.check_staleness(Utc::now()).await.unwrap(), None);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_polled_snapshot_is_never_stale() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::Body(
        two_lessons(),
        Some(Utc::now() - Duration::hours(48)),
    )));
    let handle = handle_for(source, &store, true);

    handle.refresh_static().await.unwrap();
    assert_eq!(handle.check_staleness(Utc::now()).await.unwrap(), None);

    // Turning polling off makes the age count again
    handle.set_auto_refresh(false).await.unwrap();
    assert!(handle.check_staleness(Utc::now()).await.unwrap().is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_grouped_view_hides_past_days() {
    let store = MemoryStore::new();
    let handle = handle_for(Arc::new(FakeSource::new(StaticReply::NotFound)), &store, false);
    let now = Utc::now();

    handle
        .upload_file(calendar(&[
            ("Last week", now - Duration::days(7)),
            ("Day before", now - Duration::days(2)),
            ("Tomorrow", now + Duration::days(1)),
            ("Next week", now + Duration::days(7)),
        ]))
        .await
        .unwrap();

    let view = handle.grouped_view(now).await.unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view.event_count(), 2);

    // The stored snapshot is not filtered
    assert_eq!(handle.snapshot().await.unwrap().unwrap().len(), 4);

    // Viewed ten days later everything is in the past
    let later = handle.grouped_view(now + Duration::days(10)).await.unwrap();
    assert!(later.is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_identifier_fetch_is_remembered() {
    let store = MemoryStore::new();
    let source = FakeSource::new(StaticReply::NotFound).with_export(
        "date;time;subject;room\n2099-01-05;08:00;Algebra;A1\n;09:00;Ghost;A2\n2099-01-05;10:00;Physics;B1\n",
    );
    let handle = handle_for(Arc::new(source), &store, false);

    assert_eq!(handle.remembered_identifier().await.unwrap(), None);

    let outcome = handle.fetch_for_identifier(" 12345 ", None).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Installed { events: 2 });
    assert_eq!(
        handle.remembered_identifier().await.unwrap().as_deref(),
        Some("12345")
    );

    let status = handle.status().await.unwrap();
    assert_eq!(status.source, Some(SourceKind::Identifier));

    let view = handle.grouped_view(Utc::now()).await.unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view.event_count(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_teardown_discards_parsed_result() {
    /// Source whose fetch finishes only after the session is torn down
    struct TearingDownSource {
        cancel: CancellationToken,
        body: String,
    }

    #[async_trait]
    impl ScheduleSource for TearingDownSource {
        async fn fetch(&self, _request: &SourceRequest) -> DashResult<FetchedSource> {
            self.cancel.cancel();
            Ok(FetchedSource::from_file(&self.body))
        }
    }

    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let source = Arc::new(TearingDownSource {
        cancel: cancel.clone(),
        body: two_lessons(),
    });
    let mut session = TimetableSession::new(settings(false), source, Arc::new(store.clone()), cancel);

    let outcome = session
        .ingest(&SourceRequest::StaticEndpoint, Utc::now())
        .await
        .unwrap();

    assert_eq!(outcome, IngestOutcome::Discarded);
    assert!(session.snapshot().is_none());
    assert!(store.get(keys::TIMETABLE_SNAPSHOT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_abandons_pending_fetch() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::NotFound).gated());
    let handle = handle_for(Arc::clone(&source), &store, false);

    let pending = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.upload_file(two_lessons()).await })
    };

    // Wait until the fetch is in flight
    source.started.notified().await;
    handle.shutdown().await.unwrap();

    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, IngestOutcome::Discarded);
    assert!(store.get(keys::TIMETABLE_SNAPSHOT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_identical_queued_requests_are_coalesced() {
    let store = MemoryStore::new();
    let source = Arc::new(
        FakeSource::new(StaticReply::Body(two_lessons(), None)).gated(),
    );
    let handle = handle_for(Arc::clone(&source), &store, false);

    let first = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.refresh_static().await })
    };
    source.started.notified().await;

    // Queue more work behind the blocked fetch
    let queued: Vec<_> = (0..2)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.refresh_static().await })
        })
        .collect();
    let upload = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.upload_file(two_lessons()).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    source.open_gate();

    assert_eq!(
        first.await.unwrap().unwrap(),
        IngestOutcome::Installed { events: 2 }
    );
    for request in queued {
        assert_eq!(request.await.unwrap().unwrap(), IngestOutcome::Coalesced);
    }
    assert_eq!(
        upload.await.unwrap().unwrap(),
        IngestOutcome::Installed { events: 2 }
    );

    // One static fetch and one upload
    assert_eq!(source.fetches(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_polls_only_with_auto_refresh() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::Body(two_lessons(), None)));
    let handle = handle_for(Arc::clone(&source), &store, true);

    let mut scheduler = RefreshScheduler::spawn(
        handle.clone(),
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(3600),
    );

    // Immediate poll plus one after the first interval
    tokio::time::sleep(std::time::Duration::from_secs(301)).await;
    assert_eq!(source.fetches(), 2);

    handle.set_auto_refresh(false).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(900)).await;
    assert_eq!(source.fetches(), 2);

    scheduler.shutdown().await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scheduler_shutdown_leaves_handle_usable() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::NotFound));
    let handle = handle_for(Arc::clone(&source), &store, true);

    let mut scheduler = RefreshScheduler::spawn(
        handle.clone(),
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(3600),
    );
    source.started.notified().await;
    scheduler.shutdown().await;

    // The poll that was in flight still reports "not configured"
    let status = handle.status().await.unwrap();
    assert_eq!(status.advisory, Some(Advisory::NotConfigured));
    assert_eq!(status.events, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_keeps_uploaded_snapshot() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::Body(
        calendar(&[("Host file", Utc::now() + Duration::days(1))]),
        None,
    )));
    let handle = handle_for(Arc::clone(&source), &store, true);
    handle.upload_file(two_lessons()).await.unwrap();

    let mut scheduler = RefreshScheduler::spawn(
        handle.clone(),
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(3600),
    );
    tokio::time::sleep(std::time::Duration::from_secs(601)).await;

    // Only the upload reached the source
    assert_eq!(source.fetches(), 1);
    let status = handle.status().await.unwrap();
    assert_eq!(status.source, Some(SourceKind::File));
    assert_eq!(status.events, 2);
    assert_eq!(status.advisory, None);

    scheduler.shutdown().await;
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_keeps_identifier_snapshot_without_static_file() {
    let store = MemoryStore::new();
    let source = Arc::new(
        FakeSource::new(StaticReply::NotFound)
            .with_export("date;time;subject\n2099-01-05;08:00;Algebra\n"),
    );
    let handle = handle_for(Arc::clone(&source), &store, true);
    handle.fetch_for_identifier("12345", None).await.unwrap();

    let mut scheduler = RefreshScheduler::spawn(
        handle.clone(),
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(3600),
    );
    tokio::time::sleep(std::time::Duration::from_secs(601)).await;

    assert_eq!(source.fetches(), 1);
    let status = handle.status().await.unwrap();
    assert_eq!(status.source, Some(SourceKind::Identifier));
    assert_eq!(status.events, 1);
    assert_eq!(status.advisory, None);

    // An explicit refresh still reaches the static endpoint
    assert!(handle.refresh_static().await.is_err());
    assert_eq!(source.fetches(), 2);

    scheduler.shutdown().await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_poll_skips_when_another_source_owns_snapshot() {
    let store = MemoryStore::new();
    let source = Arc::new(FakeSource::new(StaticReply::Body(two_lessons(), None)));
    let handle = handle_for(Arc::clone(&source), &store, true);

    // Nothing installed yet, so the poll fetches
    assert_eq!(
        handle.poll_static().await.unwrap(),
        Some(IngestOutcome::Installed { events: 2 })
    );
    assert_eq!(
        handle.status().await.unwrap().source,
        Some(SourceKind::StaticEndpoint)
    );

    handle.upload_file(two_lessons()).await.unwrap();
    assert_eq!(handle.poll_static().await.unwrap(), None);
    assert_eq!(source.fetches(), 2);

    handle.set_auto_refresh(false).await.unwrap();
    assert_eq!(handle.poll_static().await.unwrap(), None);

    handle.shutdown().await.unwrap();
}
