use super::fetcher::SourceRequest;
use super::models::{Advisory, GroupedView, ScheduleSnapshot};
use super::session::{IngestOutcome, SessionStatus, TimetableSession};
use crate::error::{component_error, DashResult};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The timetable actor that owns the session and processes messages
pub struct TimetableActor {
    session: TimetableSession,
    command_rx: mpsc::Receiver<TimetableCommand>,
    backlog: VecDeque<TimetableCommand>,
}

/// Commands that can be sent to the timetable actor
pub enum TimetableCommand {
    Restore(mpsc::Sender<bool>),
    Ingest(SourceRequest, mpsc::Sender<DashResult<IngestOutcome>>),
    PollStatic(mpsc::Sender<DashResult<Option<IngestOutcome>>>),
    RememberedIdentifier(mpsc::Sender<DashResult<Option<String>>>),
    Snapshot(mpsc::Sender<Option<Arc<ScheduleSnapshot>>>),
    GroupedView(DateTime<Utc>, mpsc::Sender<GroupedView>),
    CheckStaleness(DateTime<Utc>, mpsc::Sender<Option<Advisory>>),
    Status(mpsc::Sender<SessionStatus>),
    DismissAdvisory(mpsc::Sender<bool>),
    SetAutoRefresh(bool, mpsc::Sender<()>),
    Shutdown,
}

/// Handle for communicating with the timetable actor
#[derive(Clone)]
pub struct TimetableActorHandle {
    command_tx: mpsc::Sender<TimetableCommand>,
}

impl TimetableActorHandle {
    pub async fn restore(&self) -> DashResult<bool> {
        self.request(TimetableCommand::Restore).await
    }

    pub async fn ingest(&self, request: SourceRequest) -> DashResult<IngestOutcome> {
        self.request(|tx| TimetableCommand::Ingest(request, tx))
            .await?
    }

    pub async fn poll_static(&self) -> DashResult<Option<IngestOutcome>> {
        self.request(TimetableCommand::PollStatic).await?
    }

    pub async fn remembered_identifier(&self) -> DashResult<Option<String>> {
        self.request(TimetableCommand::RememberedIdentifier).await?
    }

    pub async fn snapshot(&self) -> DashResult<Option<Arc<ScheduleSnapshot>>> {
        self.request(TimetableCommand::Snapshot).await
    }

    pub async fn grouped_view(&self, now: DateTime<Utc>) -> DashResult<GroupedView> {
        self.request(|tx| TimetableCommand::GroupedView(now, tx))
            .await
    }

    pub async fn check_staleness(&self, now: DateTime<Utc>) -> DashResult<Option<Advisory>> {
        self.request(|tx| TimetableCommand::CheckStaleness(now, tx))
            .await
    }

    pub async fn status(&self) -> DashResult<SessionStatus> {
        self.request(TimetableCommand::Status).await
    }

    pub async fn dismiss_advisory(&self) -> DashResult<bool> {
        self.request(TimetableCommand::DismissAdvisory).await
    }

    pub async fn set_auto_refresh(&self, enabled: bool) -> DashResult<()> {
        self.request(|tx| TimetableCommand::SetAutoRefresh(enabled, tx))
            .await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> DashResult<()> {
        let _ = self.command_tx.send(TimetableCommand::Shutdown).await;
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<T>) -> TimetableCommand,
    ) -> DashResult<T> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(build(response_tx))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Response channel closed"))
    }
}

impl TimetableActor {
    /// Create a new actor and return its handle
    pub fn new(session: TimetableSession) -> (Self, TimetableActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self {
            session,
            command_rx,
            backlog: VecDeque::new(),
        };

        let handle = TimetableActorHandle { command_tx };

        (actor, handle)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Timetable actor started");

        while let Some(cmd) = self.next_command().await {
            match cmd {
                TimetableCommand::Restore(response_tx) => {
                    let restored = self.session.restore().await;
                    let _ = response_tx.send(restored).await;
                }
                TimetableCommand::Ingest(request, response_tx) => {
                    let result = self.session.ingest(&request, Utc::now()).await;
                    let installed = matches!(result, Ok(IngestOutcome::Installed { .. }));
                    let _ = response_tx.send(result).await;

                    if installed {
                        self.coalesce(&request).await;
                    }
                }
                TimetableCommand::PollStatic(response_tx) => {
                    let result = self.session.poll_static(Utc::now()).await;
                    let installed = matches!(result, Ok(Some(IngestOutcome::Installed { .. })));
                    let _ = response_tx.send(result).await;

                    if installed {
                        self.coalesce(&SourceRequest::StaticEndpoint).await;
                    }
                }
                TimetableCommand::RememberedIdentifier(response_tx) => {
                    let result = self.session.remembered_identifier().await;
                    let _ = response_tx.send(result).await;
                }
                TimetableCommand::Snapshot(response_tx) => {
                    let _ = response_tx.send(self.session.snapshot()).await;
                }
                TimetableCommand::GroupedView(now, response_tx) => {
                    let _ = response_tx.send(self.session.grouped_view(now)).await;
                }
                TimetableCommand::CheckStaleness(now, response_tx) => {
                    let advisory = self.session.check_staleness(now);
                    let _ = response_tx.send(advisory).await;
                }
                TimetableCommand::Status(response_tx) => {
                    let _ = response_tx.send(self.session.status()).await;
                }
                TimetableCommand::DismissAdvisory(response_tx) => {
                    let dismissed = self.session.dismiss_advisory();
                    let _ = response_tx.send(dismissed).await;
                }
                TimetableCommand::SetAutoRefresh(enabled, response_tx) => {
                    self.session.set_auto_refresh(enabled);
                    let _ = response_tx.send(()).await;
                }
                TimetableCommand::Shutdown => {
                    info!("Timetable actor shutting down");
                    break;
                }
            }
        }

        info!("Timetable actor shut down");
    }

    async fn next_command(&mut self) -> Option<TimetableCommand> {
        match self.backlog.pop_front() {
            Some(cmd) => Some(cmd),
            None => self.command_rx.recv().await,
        }
    }

    /// Answer queued requests identical to `request` without running them
    async fn coalesce(&mut self, request: &SourceRequest) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.backlog.push_back(cmd);
        }

        let mut remaining = VecDeque::with_capacity(self.backlog.len());
        let mut coalesced = 0usize;

        for cmd in self.backlog.drain(..) {
            match cmd {
                TimetableCommand::Ingest(queued, response_tx) if queued == *request => {
                    let _ = response_tx.send(Ok(IngestOutcome::Coalesced)).await;
                    coalesced += 1;
                }
                other => remaining.push_back(other),
            }
        }

        if coalesced > 0 {
            debug!(coalesced, "Coalesced queued timetable requests");
        }
        self.backlog = remaining;
    }
}
