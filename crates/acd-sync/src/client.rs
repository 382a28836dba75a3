use crate::api::ProjectApi;
use crate::config::SyncConfig;
use crate::endpoint::project_ws_url;
use crate::error::SyncError;
use crate::session::Session;
use crate::store::StateStore;
use crate::transport::Connector;
use acd_core::{ClientFrame, ConnectionState, ProjectState};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct ActiveSession {
    scope: String,
    shutdown: watch::Sender<bool>,
    outbound: mpsc::Sender<ClientFrame>,
    retry_now: watch::Sender<u64>,
    task: JoinHandle<()>,
}

/// Live view of one project at a time. Owns at most one session driver;
/// switching scope or dropping the client tears the previous one down
/// before anything else happens.
///
/// Methods that start a session must be called from within a Tokio runtime.
pub struct SyncClient {
    config: Arc<SyncConfig>,
    connector: Arc<dyn Connector>,
    api: Option<Arc<dyn ProjectApi>>,
    store: Arc<StateStore>,
    active: Option<ActiveSession>,
}

impl SyncClient {
    pub fn new(config: SyncConfig, connector: Arc<dyn Connector>) -> Self {
        let store = Arc::new(StateStore::new(config.log_capacity));
        Self {
            config: Arc::new(config),
            connector,
            api: None,
            store,
            active: None,
        }
    }

    /// Enables reconciliation after reconnects and question answering.
    pub fn with_api(mut self, api: Arc<dyn ProjectApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn scope(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.scope.as_str())
    }

    pub fn connection(&self) -> ConnectionState {
        self.store.connection()
    }

    pub fn state(&self) -> ProjectState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProjectState> {
        self.store.subscribe()
    }

    /// Starts streaming `scope`. Re-connecting to the live scope is a no-op,
    /// or an early retry if the session is between attempts. Any other scope
    /// replaces the current session and starts from a fresh projection.
    pub fn connect(&mut self, scope: &str) -> Result<(), SyncError> {
        let url = project_ws_url(&self.config.origin, scope)?;
        if let Some(active) = &self.active {
            if active.scope == scope && !active.task.is_finished() {
                match self.store.connection() {
                    ConnectionState::Connecting | ConnectionState::Connected => {
                        debug!("connect_noop: scope={scope}");
                    }
                    ConnectionState::Disconnected => {
                        debug!("connect_wakes_retry: scope={scope}");
                        active.retry_now.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
                    }
                }
                return Ok(());
            }
        }
        self.disconnect();

        let generation = self.store.begin_scope(scope, self.config.log_capacity);
        self.store.set_connection(generation, ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let (retry_now, retry_rx) = watch::channel(0u64);
        let session = Session {
            scope: scope.to_string(),
            generation,
            url,
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            api: self.api.clone(),
            store: Arc::clone(&self.store),
            shutdown: shutdown_rx,
            outbound: outbound_rx,
            retry_now: retry_rx,
        };
        let task = tokio::spawn(session.run());
        info!("session_started: scope={scope} generation={generation}");
        self.active = Some(ActiveSession {
            scope: scope.to_string(),
            shutdown: shutdown_tx,
            outbound: outbound_tx,
            retry_now,
            task,
        });
        Ok(())
    }

    /// Stops the current session. Once this returns no frame, probe or retry
    /// from it can touch the state.
    ///
    /// This is not an unmount: the last known values stay readable, and a
    /// later `connect` to the same scope resumes on top of them. Only
    /// connecting to a different scope starts from a fresh projection, and
    /// dropping the client is the unmount.
    ///
    /// The driver finishes its close handshake in the background, bounded by
    /// `close_grace`. Use [`SyncClient::shutdown`] to wait for it.
    pub fn disconnect(&mut self) {
        drop(self.teardown());
    }

    /// Like [`SyncClient::disconnect`], but returns only once the driver has
    /// closed its transport and exited.
    pub async fn shutdown(&mut self) {
        let Some(task) = self.teardown() else {
            return;
        };
        if let Err(err) = task.await {
            debug!("session_join_failed: {err}");
        }
    }

    /// Drops the live connection and dials again at once, keeping state.
    /// The old transport is closed before the new one is opened.
    pub async fn reconnect(&mut self) -> Result<(), SyncError> {
        let scope = self.scope().map(str::to_string).ok_or(SyncError::NoScope)?;
        self.shutdown().await;
        self.connect(&scope)
    }

    fn teardown(&mut self) -> Option<JoinHandle<()>> {
        let active = self.active.take()?;
        self.store.retire();
        // the driver may already be gone; the generation bump covers that case
        let _ = active.shutdown.send(true);
        info!("session_teardown: scope={}", active.scope);
        Some(active.task)
    }

    /// Queues `frame` for the live connection. Returns false, dropping the
    /// frame, when not connected or when the outbound queue is full.
    pub fn send(&self, frame: ClientFrame) -> bool {
        let Some(active) = &self.active else {
            debug!("send_dropped: no session");
            return false;
        };
        if !self.store.connection().is_connected() {
            debug!("send_dropped: scope={} not connected", active.scope);
            return false;
        }
        match active.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("send_dropped: scope={} outbound queue full", active.scope);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn clear_logs(&self) -> bool {
        self.store
            .mutate(self.store.generation(), |state| {
                let changed = state.clear_logs();
                (changed, changed)
            })
            .unwrap_or(false)
    }

    /// Dismisses the pending question locally without answering it.
    pub fn clear_pending_question(&self) -> bool {
        self.store
            .mutate(self.store.generation(), |state| {
                let changed = state.clear_pending_question();
                (changed, changed)
            })
            .unwrap_or(false)
    }

    /// Answers the pending question over REST, then clears it locally unless
    /// a newer question arrived meanwhile.
    pub async fn answer_question(&self, answer: &str) -> Result<(), SyncError> {
        let api = self.api.as_ref().ok_or(SyncError::ApiUnavailable)?;
        let (scope, id) = self
            .store
            .read(|state| {
                let scope = state.scope()?.to_string();
                let id = state.pending_question().map(|question| question.id.clone());
                Some((scope, id))
            })
            .ok_or(SyncError::NoScope)?;
        let id = id.ok_or(SyncError::NoPendingQuestion)?;

        api.answer_question(&scope, &id, answer).await?;
        info!("question_answered: scope={scope} id={id}");
        self.store.mutate(self.store.generation(), |state| {
            let changed = state.resolve_question(&id);
            (changed, changed)
        });
        Ok(())
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
