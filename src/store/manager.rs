use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::persist::SessionPersistence;
use crate::bridge::{BridgeError, BridgeEvent, TerminalBridge};
use crate::core::{
    AttachHandle, AttachState, FilterCache, FilteredSessions, Message, MetricsDelta, Session,
    SessionQuery, SessionStatus, TerminalAttachment, ToolCall,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot {action} a session in status {status}")]
    IllegalTransition {
        action: &'static str,
        status: SessionStatus,
    },
    #[error("session not found: {0}")]
    NotFound(Uuid),
    #[error("session {0} has no working directory")]
    MissingWorkingDirectory(Uuid),
    #[error("terminal for session {0} is not accepting input")]
    TerminalNotWritable(Uuid),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] super::persist::PersistenceError),
    #[error("session store is not running")]
    StoreClosed,
}

/// Lifecycle actions that run through the bridge before they commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl Transition {
    fn action(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
        }
    }

    /// Whether `status` is a legal source state for this transition.
    /// Checked when the transition is issued and again when its bridge
    /// call commits, since the session may have moved in between.
    fn legal_from(&self, status: SessionStatus) -> bool {
        match self {
            Self::Start => status == SessionStatus::Waiting,
            Self::Pause => status == SessionStatus::Running,
            Self::Resume => status == SessionStatus::Paused,
            Self::Cancel => matches!(status, SessionStatus::Running | SessionStatus::Waiting),
            Self::Retry => status == SessionStatus::Failed,
        }
    }
}

/// Commands accepted by the store actor. Every mutation of the session
/// collection travels through this channel, which is what serializes the
/// revision counter and the collection updates.
enum StoreCommand {
    Create {
        agent_type: crate::core::AgentType,
        working_directory: Option<String>,
        name: Option<String>,
        response_tx: oneshot::Sender<Session>,
    },
    Update {
        session: Session,
        response_tx: oneshot::Sender<Result<(), StoreError>>,
    },
    Delete {
        session_id: Uuid,
        response_tx: oneshot::Sender<Result<(), StoreError>>,
    },
    ClearCompleted {
        response_tx: oneshot::Sender<usize>,
    },
    AppendMessage {
        session_id: Uuid,
        message: Message,
        response_tx: oneshot::Sender<()>,
    },
    AppendToolCall {
        session_id: Uuid,
        tool_call: ToolCall,
        response_tx: oneshot::Sender<()>,
    },
    UpdateToolCall {
        session_id: Uuid,
        tool_call: ToolCall,
        response_tx: oneshot::Sender<()>,
    },
    RecordMetrics {
        session_id: Uuid,
        delta: MetricsDelta,
        response_tx: oneshot::Sender<()>,
    },
    ResetMetrics {
        session_id: Uuid,
        response_tx: oneshot::Sender<()>,
    },
    Select {
        session_id: Option<Uuid>,
        response_tx: oneshot::Sender<()>,
    },
    Selected {
        response_tx: oneshot::Sender<Option<Uuid>>,
    },
    Sessions {
        response_tx: oneshot::Sender<Vec<Session>>,
    },
    GetSession {
        session_id: Uuid,
        response_tx: oneshot::Sender<Option<Session>>,
    },
    Filtered {
        query: SessionQuery,
        response_tx: oneshot::Sender<FilteredSessions>,
    },
    Revision {
        response_tx: oneshot::Sender<u64>,
    },
    Transition {
        session_id: Uuid,
        transition: Transition,
        response_tx: oneshot::Sender<Result<(), StoreError>>,
    },
    Attach {
        session_id: Uuid,
        response_tx: oneshot::Sender<Result<AttachHandle, StoreError>>,
    },
    Detach {
        session_id: Uuid,
        response_tx: oneshot::Sender<()>,
    },
    WriteInput {
        session_id: Uuid,
        data: Vec<u8>,
        response_tx: oneshot::Sender<Result<(), StoreError>>,
    },
    Resize {
        session_id: Uuid,
        rows: u16,
        cols: u16,
        response_tx: oneshot::Sender<Result<(), StoreError>>,
    },
    UpsertExternal {
        session: Session,
        response_tx: oneshot::Sender<()>,
    },
}

/// Commit messages re-entering the serialized mutation path after an
/// asynchronous bridge call resolved. If the target session was deleted
/// while the call was in flight the commit is discarded.
struct TransitionCommit {
    session_id: Uuid,
    transition: Transition,
    result: Result<i32, BridgeError>,
    response_tx: oneshot::Sender<Result<(), StoreError>>,
}

/// Cloneable handle to the session store actor.
#[derive(Clone)]
pub struct SessionStoreHandle {
    command_tx: mpsc::UnboundedSender<StoreCommand>,
}

impl SessionStoreHandle {
    /// Spawn the store actor. `bridge_rx` is the event side of the
    /// terminal bridge feeding this store.
    pub fn spawn(
        persistence: SessionPersistence,
        bridge: Arc<dyn TerminalBridge>,
        buffer_cap: usize,
        initial_sessions: Vec<Session>,
        bridge_rx: mpsc::UnboundedReceiver<BridgeEvent>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();

        let mut attachments = HashMap::new();
        for session in &initial_sessions {
            if let Some(history) = &session.terminal_output {
                attachments.insert(
                    session.id,
                    TerminalAttachment::with_history(buffer_cap, history),
                );
            }
        }

        let actor = StoreActor {
            sessions: initial_sessions,
            selected: None,
            revision: 0,
            cache: FilterCache::default(),
            attachments,
            buffer_cap,
            persistence,
            bridge,
            command_rx,
            bridge_rx,
            commit_tx,
            commit_rx,
        };
        tokio::spawn(actor.run());

        Self { command_tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(make(response_tx))
            .map_err(|_| StoreError::StoreClosed)?;
        response_rx.await.map_err(|_| StoreError::StoreClosed)
    }

    pub async fn create(
        &self,
        agent_type: crate::core::AgentType,
        working_directory: Option<String>,
        name: Option<String>,
    ) -> Result<Session, StoreError> {
        self.request(|response_tx| StoreCommand::Create {
            agent_type,
            working_directory,
            name,
            response_tx,
        })
        .await
    }

    /// Replace the stored record with the same id. Unknown ids are a
    /// silent no-op; persistence failures are surfaced without rolling
    /// back the in-memory replacement.
    pub async fn update(&self, session: Session) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::Update {
            session,
            response_tx,
        })
        .await?
    }

    pub async fn delete(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::Delete {
            session_id,
            response_tx,
        })
        .await?
    }

    /// Remove every session in a terminal status. Returns how many were
    /// removed; the filter cache is invalidated once, not per row.
    pub async fn clear_completed(&self) -> Result<usize, StoreError> {
        self.request(|response_tx| StoreCommand::ClearCompleted { response_tx })
            .await
    }

    pub async fn append_message(
        &self,
        session_id: Uuid,
        message: Message,
    ) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::AppendMessage {
            session_id,
            message,
            response_tx,
        })
        .await
    }

    pub async fn append_tool_call(
        &self,
        session_id: Uuid,
        tool_call: ToolCall,
    ) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::AppendToolCall {
            session_id,
            tool_call,
            response_tx,
        })
        .await
    }

    pub async fn update_tool_call(
        &self,
        session_id: Uuid,
        tool_call: ToolCall,
    ) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::UpdateToolCall {
            session_id,
            tool_call,
            response_tx,
        })
        .await
    }

    pub async fn record_metrics(
        &self,
        session_id: Uuid,
        delta: MetricsDelta,
    ) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::RecordMetrics {
            session_id,
            delta,
            response_tx,
        })
        .await
    }

    pub async fn reset_metrics(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::ResetMetrics {
            session_id,
            response_tx,
        })
        .await
    }

    pub async fn select(&self, session_id: Option<Uuid>) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::Select {
            session_id,
            response_tx,
        })
        .await
    }

    pub async fn selected(&self) -> Result<Option<Uuid>, StoreError> {
        self.request(|response_tx| StoreCommand::Selected { response_tx })
            .await
    }

    pub async fn sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.request(|response_tx| StoreCommand::Sessions { response_tx })
            .await
    }

    pub async fn session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        self.request(|response_tx| StoreCommand::GetSession {
            session_id,
            response_tx,
        })
        .await
    }

    pub async fn filtered(&self, query: SessionQuery) -> Result<FilteredSessions, StoreError> {
        self.request(|response_tx| StoreCommand::Filtered { query, response_tx })
            .await
    }

    pub async fn revision(&self) -> Result<u64, StoreError> {
        self.request(|response_tx| StoreCommand::Revision { response_tx })
            .await
    }

    /// Spawn the backing process for a Waiting session.
    pub async fn start(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.transition(session_id, Transition::Start).await
    }

    pub async fn pause(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.transition(session_id, Transition::Pause).await
    }

    pub async fn resume(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.transition(session_id, Transition::Resume).await
    }

    pub async fn cancel(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.transition(session_id, Transition::Cancel).await
    }

    /// Re-spawn a Failed session: clears the error, returns it to
    /// Waiting, and starts a fresh process with the original agent type
    /// and working directory.
    pub async fn retry(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.transition(session_id, Transition::Retry).await
    }

    async fn transition(
        &self,
        session_id: Uuid,
        transition: Transition,
    ) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::Transition {
            session_id,
            transition,
            response_tx,
        })
        .await?
    }

    /// Bind a viewer to a session's terminal: replay the retained buffer,
    /// then follow live output.
    pub async fn attach(&self, session_id: Uuid) -> Result<AttachHandle, StoreError> {
        self.request(|response_tx| StoreCommand::Attach {
            session_id,
            response_tx,
        })
        .await?
    }

    /// Sever live forwarding; the retained buffer is kept.
    pub async fn detach(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::Detach {
            session_id,
            response_tx,
        })
        .await
    }

    pub async fn write_input(&self, session_id: Uuid, data: Vec<u8>) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::WriteInput {
            session_id,
            data,
            response_tx,
        })
        .await?
    }

    pub async fn resize(
        &self,
        session_id: Uuid,
        rows: u16,
        cols: u16,
    ) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::Resize {
            session_id,
            rows,
            cols,
            response_tx,
        })
        .await?
    }

    /// Insert or refresh a session discovered outside this process
    /// (external session JSON appearing in the sessions directory).
    pub async fn upsert_external(&self, session: Session) -> Result<(), StoreError> {
        self.request(|response_tx| StoreCommand::UpsertExternal {
            session,
            response_tx,
        })
        .await
    }
}

struct StoreActor {
    /// Most-recent-first; `create` prepends.
    sessions: Vec<Session>,
    selected: Option<Uuid>,
    /// Bumped on every mutation; keys the filter cache.
    revision: u64,
    cache: FilterCache,
    attachments: HashMap<Uuid, TerminalAttachment>,
    buffer_cap: usize,
    persistence: SessionPersistence,
    bridge: Arc<dyn TerminalBridge>,
    command_rx: mpsc::UnboundedReceiver<StoreCommand>,
    bridge_rx: mpsc::UnboundedReceiver<BridgeEvent>,
    commit_tx: mpsc::UnboundedSender<TransitionCommit>,
    commit_rx: mpsc::UnboundedReceiver<TransitionCommit>,
}

impl StoreActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
                Some(commit) = self.commit_rx.recv() => {
                    self.handle_commit(commit).await;
                }
                Some(event) = self.bridge_rx.recv() => {
                    self.handle_bridge_event(event).await;
                }
                else => {
                    tracing::info!("Session store shutting down");
                    break;
                }
            }
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn find(&self, session_id: Uuid) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == session_id)
    }

    async fn persist(&self, session: &Session) -> Result<(), StoreError> {
        self.persistence.save(session).await.map_err(StoreError::from)
    }

    /// Best-effort persistence for mutations whose caller does not care
    /// about disk state; the in-memory store stays the source of truth.
    async fn persist_quietly(&self, session: &Session) {
        if let Err(e) = self.persistence.save(session).await {
            tracing::warn!("Failed to persist session {}: {}", session.id, e);
        }
    }

    async fn handle_command(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::Create {
                agent_type,
                working_directory,
                name,
                response_tx,
            } => {
                let name = name.unwrap_or_else(|| {
                    format!("{} Session", agent_type.display_name())
                });
                let mut session = Session::new(name, agent_type);
                session.working_directory = working_directory;

                self.sessions.insert(0, session.clone());
                self.selected = Some(session.id);
                self.bump();
                self.persist_quietly(&session).await;

                let _ = response_tx.send(session);
            }
            StoreCommand::Update {
                session,
                response_tx,
            } => {
                let result = match self.find(session.id) {
                    Some(idx) => {
                        self.sessions[idx] = session.clone();
                        self.bump();
                        self.persist(&session).await
                    }
                    // Unknown id is deliberately not an error.
                    None => Ok(()),
                };
                let _ = response_tx.send(result);
            }
            StoreCommand::Delete {
                session_id,
                response_tx,
            } => {
                let result = self.delete_session(session_id).await;
                let _ = response_tx.send(result);
            }
            StoreCommand::ClearCompleted { response_tx } => {
                let (removed, kept): (Vec<Session>, Vec<Session>) = self
                    .sessions
                    .drain(..)
                    .partition(|s| s.status.is_terminal());
                self.sessions = kept;

                if self
                    .selected
                    .map_or(false, |id| removed.iter().any(|s| s.id == id))
                {
                    self.selected = self.sessions.first().map(|s| s.id);
                }
                for session in &removed {
                    self.attachments.remove(&session.id);
                    if let Err(e) = self.persistence.delete(session.id).await {
                        tracing::warn!("Failed to delete session file {}: {}", session.id, e);
                    }
                }
                self.bump();

                let _ = response_tx.send(removed.len());
            }
            StoreCommand::AppendMessage {
                session_id,
                message,
                response_tx,
            } => {
                if let Some(idx) = self.find(session_id) {
                    self.sessions[idx].messages.push(message);
                    // Message content feeds free-text search, so the
                    // cached filtered view is stale now.
                    self.bump();
                }
                let _ = response_tx.send(());
            }
            StoreCommand::AppendToolCall {
                session_id,
                tool_call,
                response_tx,
            } => {
                if let Some(idx) = self.find(session_id) {
                    let session = &mut self.sessions[idx];
                    session.tool_calls.push(tool_call);
                    session.metrics.tool_call_count += 1;
                    self.bump();
                }
                let _ = response_tx.send(());
            }
            StoreCommand::UpdateToolCall {
                session_id,
                tool_call,
                response_tx,
            } => {
                if let Some(idx) = self.find(session_id) {
                    let session = &mut self.sessions[idx];
                    if let Some(existing) = session
                        .tool_calls
                        .iter_mut()
                        .find(|c| c.id == tool_call.id)
                    {
                        *existing = tool_call;
                        self.bump();
                    }
                }
                let _ = response_tx.send(());
            }
            StoreCommand::RecordMetrics {
                session_id,
                delta,
                response_tx,
            } => {
                if let Some(idx) = self.find(session_id) {
                    self.sessions[idx].metrics.apply(&delta);
                    self.bump();
                }
                let _ = response_tx.send(());
            }
            StoreCommand::ResetMetrics {
                session_id,
                response_tx,
            } => {
                if let Some(idx) = self.find(session_id) {
                    self.sessions[idx].metrics.reset();
                    self.bump();
                }
                let _ = response_tx.send(());
            }
            StoreCommand::Select {
                session_id,
                response_tx,
            } => {
                self.selected = session_id.filter(|id| self.find(*id).is_some());
                let _ = response_tx.send(());
            }
            StoreCommand::Selected { response_tx } => {
                let _ = response_tx.send(self.selected);
            }
            StoreCommand::Sessions { response_tx } => {
                let _ = response_tx.send(self.sessions.clone());
            }
            StoreCommand::GetSession {
                session_id,
                response_tx,
            } => {
                let session = self.find(session_id).map(|idx| self.sessions[idx].clone());
                let _ = response_tx.send(session);
            }
            StoreCommand::Filtered { query, response_tx } => {
                let result = match self.cache.get(&query, self.revision) {
                    Some(hit) => hit,
                    None => {
                        let computed =
                            crate::core::filter::filter_sessions(&self.sessions, &query);
                        self.cache.put(query, self.revision, computed.clone());
                        computed
                    }
                };
                let _ = response_tx.send(result);
            }
            StoreCommand::Revision { response_tx } => {
                let _ = response_tx.send(self.revision);
            }
            StoreCommand::Transition {
                session_id,
                transition,
                response_tx,
            } => {
                self.begin_transition(session_id, transition, response_tx);
            }
            StoreCommand::Attach {
                session_id,
                response_tx,
            } => {
                let result = if self.find(session_id).is_some() {
                    let attachment = self.attachment_mut(session_id);
                    Ok(attachment.subscribe())
                } else {
                    Err(StoreError::NotFound(session_id))
                };
                let _ = response_tx.send(result);
            }
            StoreCommand::Detach {
                session_id,
                response_tx,
            } => {
                // Disconnect every live viewer; the buffer stays so a
                // remount can replay history.
                if let Some(attachment) = self.attachments.get_mut(&session_id) {
                    attachment.disconnect();
                }
                let _ = response_tx.send(());
            }
            StoreCommand::WriteInput {
                session_id,
                data,
                response_tx,
            } => {
                let writable = self
                    .attachments
                    .get(&session_id)
                    .map_or(false, |a| a.accepts_input());
                if !writable {
                    let _ = response_tx.send(Err(StoreError::TerminalNotWritable(session_id)));
                    return;
                }
                let bridge = self.bridge.clone();
                tokio::spawn(async move {
                    let result = bridge
                        .write(session_id, &data)
                        .await
                        .map_err(StoreError::from);
                    let _ = response_tx.send(result);
                });
            }
            StoreCommand::Resize {
                session_id,
                rows,
                cols,
                response_tx,
            } => {
                let bridge = self.bridge.clone();
                tokio::spawn(async move {
                    let result = bridge
                        .resize(session_id, rows, cols)
                        .await
                        .map_err(StoreError::from);
                    let _ = response_tx.send(result);
                });
            }
            StoreCommand::UpsertExternal {
                mut session,
                response_tx,
            } => {
                session.is_external_process = true;
                match self.find(session.id) {
                    Some(idx) => self.sessions[idx] = session,
                    None => self.sessions.insert(0, session),
                }
                self.bump();
                let _ = response_tx.send(());
            }
        }
    }

    async fn delete_session(&mut self, session_id: Uuid) -> Result<(), StoreError> {
        let Some(idx) = self.find(session_id) else {
            // Deleting a nonexistent id leaves the collection unchanged.
            return Ok(());
        };
        self.sessions.remove(idx);
        self.attachments.remove(&session_id);
        if self.selected == Some(session_id) {
            self.selected = self.sessions.first().map(|s| s.id);
        }
        self.bump();

        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.terminate(session_id).await {
                tracing::debug!("No process to terminate for {}: {}", session_id, e);
            }
        });

        self.persistence
            .delete(session_id)
            .await
            .map_err(StoreError::from)
    }

    fn attachment_mut(&mut self, session_id: Uuid) -> &mut TerminalAttachment {
        let cap = self.buffer_cap;
        self.attachments
            .entry(session_id)
            .or_insert_with(|| TerminalAttachment::new(cap))
    }

    /// Validate a lifecycle transition and hand the bridge call to a
    /// separate task. The store keeps serving commands while the call is
    /// in flight; the result re-enters through `commit_rx`.
    fn begin_transition(
        &mut self,
        session_id: Uuid,
        transition: Transition,
        response_tx: oneshot::Sender<Result<(), StoreError>>,
    ) {
        let Some(idx) = self.find(session_id) else {
            let _ = response_tx.send(Err(StoreError::NotFound(session_id)));
            return;
        };
        let session = &self.sessions[idx];
        let status = session.status;

        if !transition.legal_from(status) {
            let _ = response_tx.send(Err(StoreError::IllegalTransition {
                action: transition.action(),
                status,
            }));
            return;
        }

        let needs_spawn = matches!(transition, Transition::Start | Transition::Retry);
        let working_directory = session.working_directory.clone();
        if needs_spawn && working_directory.is_none() {
            let _ = response_tx.send(Err(StoreError::MissingWorkingDirectory(session_id)));
            return;
        }
        let agent_type = session.agent_type;

        if matches!(transition, Transition::Start) {
            self.attachment_mut(session_id).state = AttachState::Attaching;
        }

        let bridge = self.bridge.clone();
        let commit_tx = self.commit_tx.clone();
        tokio::spawn(async move {
            let result = match transition {
                Transition::Start | Transition::Retry => {
                    bridge
                        .spawn(
                            session_id,
                            agent_type,
                            PathBuf::from(working_directory.unwrap_or_default()),
                            None,
                        )
                        .await
                }
                Transition::Pause => bridge.suspend(session_id).await.map(|_| 0),
                Transition::Resume => bridge.resume(session_id).await.map(|_| 0),
                Transition::Cancel => bridge.terminate(session_id).await.map(|_| 0),
            };
            let _ = commit_tx.send(TransitionCommit {
                session_id,
                transition,
                result,
                response_tx,
            });
        });
    }

    async fn handle_commit(&mut self, commit: TransitionCommit) {
        let TransitionCommit {
            session_id,
            transition,
            result,
            response_tx,
        } = commit;

        let Some(idx) = self.find(session_id) else {
            // Session deleted while the bridge call was in flight; the
            // late result is discarded as a no-op.
            tracing::debug!(
                "Discarding {} commit for deleted session {}",
                transition.action(),
                session_id
            );
            let _ = response_tx.send(Ok(()));
            return;
        };

        // The session may have moved while the bridge call was in flight
        // (process exit, another transition). A commit whose source state
        // no longer holds is stale and must not land; in particular a
        // session that reached a terminal status stays there.
        let current = self.sessions[idx].status;
        if !transition.legal_from(current) {
            tracing::debug!(
                "Discarding stale {} commit for session {} now in {}",
                transition.action(),
                session_id,
                current
            );
            let _ = response_tx.send(Ok(()));
            return;
        }

        match result {
            Ok(pid) => {
                let session = &mut self.sessions[idx];
                match transition {
                    Transition::Start => {
                        session.set_status(SessionStatus::Running);
                        session.process_id = Some(pid);
                        self.attachment_mut(session_id).state = AttachState::Attached;
                    }
                    Transition::Pause => session.set_status(SessionStatus::Paused),
                    Transition::Resume => session.set_status(SessionStatus::Running),
                    Transition::Cancel => {
                        session.set_status(SessionStatus::Cancelled);
                        if let Some(attachment) = self.attachments.get_mut(&session_id) {
                            attachment.state = AttachState::Ended;
                        }
                    }
                    Transition::Retry => {
                        session.set_status(SessionStatus::Waiting);
                        session.error_message = None;
                        session.process_id = Some(pid);
                        self.attachment_mut(session_id).state = AttachState::Attached;
                    }
                }
                self.bump();
                let snapshot = self.sessions[idx].clone();
                self.persist_quietly(&snapshot).await;
                let _ = response_tx.send(Ok(()));
            }
            Err(e) => {
                let session = &mut self.sessions[idx];
                session.set_status(SessionStatus::Failed);
                session.error_message = Some(e.to_string());
                if let Some(attachment) = self.attachments.get_mut(&session_id) {
                    attachment.state = AttachState::Unattached;
                }
                self.bump();
                let snapshot = self.sessions[idx].clone();
                self.persist_quietly(&snapshot).await;
                let _ = response_tx.send(Err(StoreError::Bridge(e)));
            }
        }
    }

    async fn handle_bridge_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Output { session_id, bytes } => {
                if self.find(session_id).is_none() {
                    // Late output for a deleted session.
                    return;
                }
                self.attachment_mut(session_id).record(&bytes);
            }
            BridgeEvent::Ended { session_id } => {
                let Some(idx) = self.find(session_id) else {
                    return;
                };

                if let Some(attachment) = self.attachments.get_mut(&session_id) {
                    attachment.state = AttachState::Ended;
                }
                // Retain the raw buffer on the record so history survives
                // a restart.
                let history = self
                    .attachments
                    .get(&session_id)
                    .filter(|a| a.has_history())
                    .map(|a| a.history());

                let session = &mut self.sessions[idx];
                session.terminal_output = history;
                if !session.status.is_terminal() {
                    session.set_status(SessionStatus::Completed);
                }
                self.bump();
                let snapshot = self.sessions[idx].clone();
                self.persist_quietly(&snapshot).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NullBridge;
    use crate::core::{AgentType, SortOrder, ToolCallStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Bridge double that records every call and can be told to fail or
    /// to delay, so commit-path behavior is observable.
    #[derive(Default)]
    struct RecordingBridge {
        calls: StdMutex<Vec<String>>,
        fail_spawn: AtomicBool,
        delay_ms: AtomicU64,
    }

    impl RecordingBridge {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        async fn maybe_delay(&self) {
            let ms = self.delay_ms.load(Ordering::SeqCst);
            if ms > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
            }
        }
    }

    #[async_trait]
    impl TerminalBridge for RecordingBridge {
        async fn spawn(
            &self,
            _session_id: Uuid,
            agent_type: AgentType,
            working_directory: std::path::PathBuf,
            _override_executable: Option<String>,
        ) -> Result<i32, BridgeError> {
            self.maybe_delay().await;
            self.record(format!(
                "spawn {} {}",
                agent_type.display_name(),
                working_directory.display()
            ));
            if self.fail_spawn.load(Ordering::SeqCst) {
                Err(BridgeError::SpawnFailed("spawn refused".into()))
            } else {
                Ok(4321)
            }
        }

        async fn write(&self, _session_id: Uuid, data: &[u8]) -> Result<(), BridgeError> {
            self.record(format!("write {} bytes", data.len()));
            Ok(())
        }

        async fn resize(&self, _session_id: Uuid, rows: u16, cols: u16) -> Result<(), BridgeError> {
            self.record(format!("resize {}x{}", rows, cols));
            Ok(())
        }

        async fn suspend(&self, session_id: Uuid) -> Result<(), BridgeError> {
            self.maybe_delay().await;
            self.record(format!("suspend {}", session_id));
            Ok(())
        }

        async fn resume(&self, session_id: Uuid) -> Result<(), BridgeError> {
            self.maybe_delay().await;
            self.record(format!("resume {}", session_id));
            Ok(())
        }

        async fn terminate(&self, session_id: Uuid) -> Result<(), BridgeError> {
            self.maybe_delay().await;
            self.record(format!("terminate {}", session_id));
            Ok(())
        }
    }

    struct Fixture {
        store: SessionStoreHandle,
        bridge_tx: mpsc::UnboundedSender<BridgeEvent>,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(bridge: Arc<dyn TerminalBridge>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let persistence = SessionPersistence::new(dir.path().to_path_buf());
        let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
        let store = SessionStoreHandle::spawn(persistence, bridge, 1024, Vec::new(), bridge_rx);
        Fixture {
            store,
            bridge_tx,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(NullBridge))
    }

    async fn create(store: &SessionStoreHandle, name: &str) -> Session {
        store
            .create(AgentType::ClaudeCode, Some("/tmp/work".into()), Some(name.into()))
            .await
            .unwrap()
    }

    async fn set_status(store: &SessionStoreHandle, id: Uuid, status: SessionStatus) {
        let mut session = store.session(id).await.unwrap().unwrap();
        session.set_status(status);
        store.update(session).await.unwrap();
    }

    #[tokio::test]
    async fn create_prepends_waiting_sessions_with_unique_ids() {
        let f = fixture();
        let a = create(&f.store, "a").await;
        let b = create(&f.store, "b").await;
        let c = create(&f.store, "c").await;

        let sessions = f.store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Waiting));

        let names: Vec<_> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);

        let mut ids = vec![a.id, b.id, c.id];
        ids.dedup();
        assert_eq!(ids.len(), 3);

        // The newest session becomes the selection.
        assert_eq!(f.store.selected().await.unwrap(), Some(c.id));
    }

    #[tokio::test]
    async fn delete_removes_session_and_moves_selection() {
        let f = fixture();
        let a = create(&f.store, "a").await;
        let b = create(&f.store, "b").await;
        assert_eq!(f.store.selected().await.unwrap(), Some(b.id));

        f.store.delete(b.id).await.unwrap();
        assert!(f.store.session(b.id).await.unwrap().is_none());
        assert_eq!(f.store.selected().await.unwrap(), Some(a.id));

        f.store.delete(a.id).await.unwrap();
        assert_eq!(f.store.selected().await.unwrap(), None);

        // Deleting a nonexistent id leaves the collection unchanged.
        f.store.delete(Uuid::new_v4()).await.unwrap();
        assert!(f.store.sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_completed_removes_exactly_terminal_sessions() {
        let f = fixture();
        let done = create(&f.store, "done").await;
        let failed = create(&f.store, "failed").await;
        let cancelled = create(&f.store, "cancelled").await;
        let running = create(&f.store, "running").await;
        let paused = create(&f.store, "paused").await;

        set_status(&f.store, done.id, SessionStatus::Completed).await;
        set_status(&f.store, failed.id, SessionStatus::Failed).await;
        set_status(&f.store, cancelled.id, SessionStatus::Cancelled).await;
        set_status(&f.store, running.id, SessionStatus::Running).await;
        set_status(&f.store, paused.id, SessionStatus::Paused).await;

        let before = f.store.revision().await.unwrap();
        let removed = f.store.clear_completed().await.unwrap();
        assert_eq!(removed, 3);
        // One atomic pass, one cache invalidation.
        assert_eq!(f.store.revision().await.unwrap(), before + 1);

        let remaining: Vec<_> = f
            .store
            .sessions()
            .await
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(remaining, vec!["paused", "running"]);
    }

    #[tokio::test]
    async fn filtered_views_are_idempotent_without_mutation() {
        let f = fixture();
        create(&f.store, "alpha").await;
        create(&f.store, "beta").await;

        let query = SessionQuery {
            sort: SortOrder::Name,
            ..Default::default()
        };
        let first = f.store.filtered(query.clone()).await.unwrap();
        let second = f.store.filtered(query).await.unwrap();

        let ids = |r: &FilteredSessions| {
            r.active
                .iter()
                .chain(r.other.iter())
                .map(|s| s.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn any_mutation_invalidates_the_filtered_view() {
        let f = fixture();
        let session = create(&f.store, "quiet").await;

        let query = SessionQuery {
            search: "needle".into(),
            ..Default::default()
        };
        assert!(f.store.filtered(query.clone()).await.unwrap().is_empty());

        f.store
            .append_message(session.id, Message::assistant("found the needle".into()))
            .await
            .unwrap();

        let result = f.store.filtered(query).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn update_with_unknown_id_is_a_silent_noop() {
        let f = fixture();
        create(&f.store, "only").await;

        let stranger = Session::new("stranger".into(), AgentType::Codex);
        f.store.update(stranger).await.unwrap();
        assert_eq!(f.store.sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn appends_to_unknown_sessions_are_noops() {
        let f = fixture();
        let ghost = Uuid::new_v4();
        f.store
            .append_message(ghost, Message::user("hello?".into()))
            .await
            .unwrap();
        f.store
            .append_tool_call(ghost, ToolCall::new("Bash".into(), "ls".into()))
            .await
            .unwrap();
        assert!(f.store.sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_tool_call_increments_the_metric() {
        let f = fixture();
        let session = create(&f.store, "tools").await;

        f.store
            .append_tool_call(session.id, ToolCall::new("Read".into(), "src/main.rs".into()))
            .await
            .unwrap();
        f.store
            .append_tool_call(session.id, ToolCall::new("Bash".into(), "cargo fmt".into()))
            .await
            .unwrap();

        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.metrics.tool_call_count, 2);
        assert_eq!(current.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn update_tool_call_replaces_matching_entry() {
        let f = fixture();
        let session = create(&f.store, "tools").await;
        let call = ToolCall::new("Bash".into(), "npm test".into());
        f.store.append_tool_call(session.id, call.clone()).await.unwrap();

        let mut finished = call.clone();
        finished.complete("all green".into());
        f.store.update_tool_call(session.id, finished).await.unwrap();

        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.tool_calls[0].status, ToolCallStatus::Completed);
        assert_eq!(current.tool_calls[0].output.as_deref(), Some("all green"));

        // Unknown tool-call id changes nothing.
        let unknown = ToolCall::new("Web".into(), "fetch".into());
        f.store.update_tool_call(session.id, unknown).await.unwrap();
        assert_eq!(f.store.session(session.id).await.unwrap().unwrap().tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn search_covers_name_and_tool_input() {
        let f = fixture();
        let session = create(&f.store, "Auth Fix").await;
        f.store
            .append_tool_call(session.id, ToolCall::new("Bash".into(), "npm test".into()))
            .await
            .unwrap();

        for needle in ["auth", "npm test"] {
            let result = f
                .store
                .filtered(SessionQuery {
                    search: needle.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(result.len(), 1, "search '{}' should match", needle);
        }
    }

    #[tokio::test]
    async fn pause_requires_a_running_session() {
        let bridge = Arc::new(RecordingBridge::default());
        let f = fixture_with(bridge.clone());
        let session = create(&f.store, "not yet running").await;

        let err = f.store.pause(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert!(bridge.calls().is_empty());
        assert_eq!(
            f.store.session(session.id).await.unwrap().unwrap().status,
            SessionStatus::Waiting
        );

        set_status(&f.store, session.id, SessionStatus::Running).await;
        f.store.pause(session.id).await.unwrap();
        assert_eq!(
            f.store.session(session.id).await.unwrap().unwrap().status,
            SessionStatus::Paused
        );
        assert_eq!(bridge.calls(), vec![format!("suspend {}", session.id)]);

        f.store.resume(session.id).await.unwrap();
        assert_eq!(
            f.store.session(session.id).await.unwrap().unwrap().status,
            SessionStatus::Running
        );
    }

    #[tokio::test]
    async fn pause_on_completed_session_fails_without_mutation() {
        let f = fixture();
        let session = create(&f.store, "done").await;
        set_status(&f.store, session.id, SessionStatus::Completed).await;

        let err = f.store.pause(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, SessionStatus::Completed);
        assert!(current.ended_at.is_some());
    }

    #[tokio::test]
    async fn cancel_from_waiting_and_running_only() {
        let f = fixture();
        let session = create(&f.store, "to cancel").await;

        f.store.cancel(session.id).await.unwrap();
        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, SessionStatus::Cancelled);
        assert!(current.ended_at.is_some());

        let err = f.store.cancel(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn retry_respawns_with_original_agent_and_directory() {
        let bridge = Arc::new(RecordingBridge::default());
        let f = fixture_with(bridge.clone());
        let session = create(&f.store, "flaky").await;

        let mut failed = f.store.session(session.id).await.unwrap().unwrap();
        failed.set_status(SessionStatus::Failed);
        failed.error_message = Some("boom".into());
        f.store.update(failed).await.unwrap();

        f.store.retry(session.id).await.unwrap();

        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, SessionStatus::Waiting);
        assert!(current.error_message.is_none());
        assert!(current.ended_at.is_none());
        assert_eq!(bridge.calls(), vec!["spawn Claude Code /tmp/work".to_string()]);
    }

    #[tokio::test]
    async fn retry_is_rejected_unless_failed() {
        let f = fixture();
        let session = create(&f.store, "healthy").await;
        let err = f.store.retry(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn failed_spawn_marks_session_failed_with_message() {
        let bridge = Arc::new(RecordingBridge::default());
        bridge.fail_spawn.store(true, Ordering::SeqCst);
        let f = fixture_with(bridge);
        let session = create(&f.store, "will not start").await;

        let err = f.store.start(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Bridge(_)));

        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, SessionStatus::Failed);
        assert!(current
            .error_message
            .as_deref()
            .unwrap()
            .contains("spawn refused"));
    }

    #[tokio::test]
    async fn start_requires_a_working_directory() {
        let f = fixture();
        let session = f
            .store
            .create(AgentType::Codex, None, Some("nowhere".into()))
            .await
            .unwrap();
        let err = f.store.start(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingWorkingDirectory(_)));
    }

    #[tokio::test]
    async fn in_flight_transition_for_deleted_session_is_discarded() {
        let bridge = Arc::new(RecordingBridge::default());
        bridge.delay_ms.store(150, Ordering::SeqCst);
        let f = fixture_with(bridge);
        let session = create(&f.store, "short lived").await;
        set_status(&f.store, session.id, SessionStatus::Running).await;

        let store = f.store.clone();
        let id = session.id;
        let pause_task = tokio::spawn(async move { store.pause(id).await });

        // Let the validation pass and the bridge call begin, then pull
        // the session out from under it.
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        f.store.delete(session.id).await.unwrap();

        // The late commit is discarded without panicking the actor.
        pause_task.await.unwrap().unwrap();
        assert!(f.store.session(session.id).await.unwrap().is_none());
        assert!(f.store.sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_pause_commit_cannot_resurrect_an_ended_session() {
        let bridge = Arc::new(RecordingBridge::default());
        bridge.delay_ms.store(200, Ordering::SeqCst);
        let f = fixture_with(bridge);
        let session = create(&f.store, "racer").await;
        set_status(&f.store, session.id, SessionStatus::Running).await;

        let store = f.store.clone();
        let id = session.id;
        let pause_task = tokio::spawn(async move { store.pause(id).await });

        // The process exits while the suspend call is still in flight.
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        f.bridge_tx
            .send(BridgeEvent::Ended {
                session_id: session.id,
            })
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        let ended = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        let ended_at = ended.ended_at.unwrap();

        // The suspend result lands after the exit; the session must stay
        // ended, with its end timestamp intact.
        pause_task.await.unwrap().unwrap();
        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, SessionStatus::Completed);
        assert_eq!(current.ended_at, Some(ended_at));
    }

    #[tokio::test]
    async fn detach_severs_live_forwarding_but_keeps_replay() {
        let f = fixture();
        let session = create(&f.store, "viewer").await;

        f.bridge_tx
            .send(BridgeEvent::Output {
                session_id: session.id,
                bytes: b"early ".to_vec(),
            })
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        let mut handle = f.store.attach(session.id).await.unwrap();
        assert_eq!(handle.replay, b"early ");

        f.store.detach(session.id).await.unwrap();
        f.bridge_tx
            .send(BridgeEvent::Output {
                session_id: session.id,
                bytes: b"late".to_vec(),
            })
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        // The detached viewer's stream is closed, not fed.
        assert!(matches!(
            handle.live.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));

        // The buffer survived: a fresh attach replays everything.
        let reattached = f.store.attach(session.id).await.unwrap();
        assert_eq!(reattached.replay, b"early late");
    }

    #[tokio::test]
    async fn thousand_appends_then_search_finds_the_last_message() {
        let f = fixture();
        let session = create(&f.store, "busy").await;

        for i in 0..1000 {
            f.store
                .append_message(session.id, Message::assistant(format!("chunk {}", i)))
                .await
                .unwrap();
        }

        let result = f
            .store
            .filtered(SessionQuery {
                search: "chunk 999".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);

        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.messages.len(), 1000);
        assert_eq!(current.messages.last().unwrap().content, "chunk 999");
    }

    #[tokio::test]
    async fn output_events_build_the_buffer_and_ended_completes_the_session() {
        let f = fixture();
        let session = create(&f.store, "streamer").await;
        set_status(&f.store, session.id, SessionStatus::Running).await;

        f.bridge_tx
            .send(BridgeEvent::Output {
                session_id: session.id,
                bytes: b"hello ".to_vec(),
            })
            .unwrap();
        f.bridge_tx
            .send(BridgeEvent::Output {
                session_id: session.id,
                bytes: b"world".to_vec(),
            })
            .unwrap();
        f.bridge_tx
            .send(BridgeEvent::Ended {
                session_id: session.id,
            })
            .unwrap();

        // Events and the follow-up read share one serialized path, so a
        // subsequent command observes everything already applied.
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, SessionStatus::Completed);
        assert_eq!(current.terminal_output.as_deref(), Some(b"hello world".as_ref()));

        let handle = f.store.attach(session.id).await.unwrap();
        assert_eq!(handle.replay, b"hello world");
    }

    #[tokio::test]
    async fn output_for_deleted_session_is_dropped() {
        let f = fixture();
        let session = create(&f.store, "gone").await;
        f.store.delete(session.id).await.unwrap();

        f.bridge_tx
            .send(BridgeEvent::Output {
                session_id: session.id,
                bytes: b"too late".to_vec(),
            })
            .unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(f.store.sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attach_to_unknown_session_is_an_error() {
        let f = fixture();
        let err = f.store.attach(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn write_input_rejected_unless_attached() {
        let f = fixture();
        let session = create(&f.store, "silent").await;
        let err = f
            .store
            .write_input(session.id, b"ls\n".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TerminalNotWritable(_)));
    }

    #[tokio::test]
    async fn metrics_record_and_reset_through_the_store() {
        let f = fixture();
        let session = create(&f.store, "counted").await;

        f.store
            .record_metrics(
                session.id,
                MetricsDelta {
                    input_tokens: 500,
                    output_tokens: 100,
                    api_calls: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.metrics.total_tokens, 600);

        f.store.reset_metrics(session.id).await.unwrap();
        let current = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(current.metrics.total_tokens, 0);
    }

    #[tokio::test]
    async fn external_sessions_are_marked_and_upserts_replace() {
        let f = fixture();
        let mut external = Session::new("outside run".into(), AgentType::Codex);
        external.status = SessionStatus::Running;

        f.store.upsert_external(external.clone()).await.unwrap();
        let current = f.store.session(external.id).await.unwrap().unwrap();
        assert!(current.is_external_process);

        external.name = "outside run (renamed)".into();
        f.store.upsert_external(external.clone()).await.unwrap();
        let sessions = f.store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "outside run (renamed)");
    }

    #[tokio::test]
    async fn created_sessions_are_persisted_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = SessionPersistence::new(dir.path().to_path_buf());
        let (_bridge_tx, bridge_rx) = mpsc::unbounded_channel();
        let store = SessionStoreHandle::spawn(
            SessionPersistence::new(dir.path().to_path_buf()),
            Arc::new(NullBridge),
            1024,
            Vec::new(),
            bridge_rx,
        );

        let session = store
            .create(AgentType::ClaudeCode, Some("/tmp".into()), Some("kept".into()))
            .await
            .unwrap();
        // Reads are serialized behind the create, so the save completed.
        let _ = store.sessions().await.unwrap();

        assert!(persistence.exists(session.id).await);
        let reloaded = persistence.load_all().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].name, "kept");
    }
}
