use crate::api::{fetch_reconciliation, ProjectApi};
use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::store::StateStore;
use crate::transport::{CloseInfo, Connector, Transport, TransportEvent};
use acd_core::protocol::encode_client_frame;
use acd_core::{dispatch, ClientFrame, ConnectionState, Dispatch};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

/// Why a connected period ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// Teardown was requested, or this session's generation was retired.
    Shutdown,
    Closed(CloseInfo),
    Stale,
    SendFailed(TransportError),
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Driver for one scoped session: connect, stream, retry, until shut down.
/// Owns every timer and the live transport, so nothing it started survives
/// the task.
pub(crate) struct Session {
    pub scope: String,
    pub generation: u64,
    pub url: Url,
    pub config: Arc<SyncConfig>,
    pub connector: Arc<dyn Connector>,
    pub api: Option<Arc<dyn ProjectApi>>,
    pub store: Arc<StateStore>,
    pub shutdown: watch::Receiver<bool>,
    pub outbound: mpsc::Receiver<ClientFrame>,
    /// Bumped by the client to cut a retry wait short. Requests seen while a
    /// connection is up are discarded.
    pub retry_now: watch::Receiver<u64>,
}

impl Session {
    pub async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut epochs: u64 = 0;
        loop {
            if self.store.set_connection(self.generation, ConnectionState::Connecting).is_none() {
                break;
            }
            debug!("ws_connecting: scope={} url={}", self.scope, self.url);

            let opened = tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => break,
                result = self.connector.open(&self.url) => result,
            };

            match opened {
                Ok(mut transport) => {
                    attempt = 0;
                    epochs += 1;
                    if self.store.set_connection(self.generation, ConnectionState::Connected).is_none() {
                        transport.close().await;
                        break;
                    }
                    info!("ws_connected: scope={} epoch={epochs}", self.scope);
                    let _ = self.retry_now.borrow_and_update();

                    let reconcile = (epochs > 1).then(|| self.spawn_reconcile()).flatten();
                    let end = self.run_connection(transport.as_mut()).await;
                    drop(reconcile);

                    self.store.set_connection(self.generation, ConnectionState::Disconnected);
                    self.drain_outbound();
                    match end {
                        ConnectionEnd::Shutdown => break,
                        ConnectionEnd::Closed(info) if info.is_rejection() => {
                            warn!(
                                "ws_rejected: scope={} code={:?} reason={}",
                                self.scope, info.code, info.reason
                            );
                        }
                        ConnectionEnd::Closed(info) => {
                            info!(
                                "ws_closed: scope={} code={:?} reason={}",
                                self.scope, info.code, info.reason
                            );
                        }
                        ConnectionEnd::Stale => {}
                        ConnectionEnd::SendFailed(err) => warn!("ws_send_error: scope={} {err}", self.scope),
                    }
                }
                Err(err) => {
                    warn!("ws_connect_error: scope={} {err}", self.scope);
                    if self
                        .store
                        .set_connection(self.generation, ConnectionState::Disconnected)
                        .is_none()
                    {
                        break;
                    }
                }
            }

            let delay = self.config.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(
                "ws_reconnect_scheduled: scope={} delay_ms={} attempt={attempt}",
                self.scope,
                delay.as_millis()
            );
            tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => break,
                _ = sleep(delay) => {}
                Ok(()) = self.retry_now.changed() => {
                    debug!("ws_reconnect_requested: scope={}", self.scope);
                }
            }
        }
        debug!("session_finished: scope={} generation={}", self.scope, self.generation);
    }

    async fn run_connection(&mut self, transport: &mut dyn Transport) -> ConnectionEnd {
        let mut heartbeat =
            HeartbeatMonitor::start(self.config.heartbeat_interval, self.config.pong_timeout);
        loop {
            tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => {
                    self.close_with_grace(transport).await;
                    return ConnectionEnd::Shutdown;
                }
                event = transport.next_event() => match event {
                    TransportEvent::Text(raw) => {
                        if !self.handle_text(&raw, &mut heartbeat) {
                            self.close_with_grace(transport).await;
                            return ConnectionEnd::Shutdown;
                        }
                    }
                    TransportEvent::Closed(info) => return ConnectionEnd::Closed(info),
                },
                action = heartbeat.next_action() => match action {
                    HeartbeatAction::Probe => {
                        if let Err(err) = send_frame(transport, &ClientFrame::Ping).await {
                            return ConnectionEnd::SendFailed(err);
                        }
                    }
                    HeartbeatAction::Stale { waited } => {
                        warn!(
                            "heartbeat_stale: scope={} waited_ms={}",
                            self.scope,
                            waited.as_millis()
                        );
                        self.close_with_grace(transport).await;
                        return ConnectionEnd::Stale;
                    }
                },
                Some(frame) = self.outbound.recv() => {
                    if let Err(err) = send_frame(transport, &frame).await {
                        return ConnectionEnd::SendFailed(err);
                    }
                }
            }
        }
    }

    /// Returns false once this session's generation has been retired.
    fn handle_text(&self, raw: &str, heartbeat: &mut HeartbeatMonitor) -> bool {
        let outcome = self.store.mutate(self.generation, |state| {
            let outcome = dispatch(state, raw);
            let mutated = outcome.mutated();
            (outcome, mutated)
        });
        match outcome {
            None => {
                debug!("frame_after_teardown: scope={}", self.scope);
                return false;
            }
            Some(Dispatch::Applied(kind)) => debug!("frame_applied: scope={} type={kind}", self.scope),
            Some(Dispatch::Pong) => {
                if let Some(rtt) = heartbeat.on_pong() {
                    debug!("pong: scope={} rtt_ms={}", self.scope, rtt.as_millis());
                }
            }
            Some(Dispatch::Unknown(kind)) => debug!("frame_unknown: scope={} type={kind}", self.scope),
            Some(Dispatch::Malformed(err)) => warn!("frame_malformed: scope={} {err}", self.scope),
        }
        true
    }

    fn spawn_reconcile(&self) -> Option<AbortOnDrop> {
        if !self.config.reconcile_on_reconnect {
            return None;
        }
        let api = self.api.clone()?;
        let store = Arc::clone(&self.store);
        let scope = self.scope.clone();
        let generation = self.generation;
        let seen = store.revisions();
        let handle = tokio::spawn(async move {
            let fetched = fetch_reconciliation(api.as_ref(), &scope).await;
            let report = store.mutate(generation, |state| {
                let report = state.apply_reconciliation(fetched, seen);
                (report, report.any())
            });
            match report {
                Some(report) => debug!(
                    "reconciled: scope={scope} status={} progress={} question={}",
                    report.status_applied, report.progress_applied, report.question_applied
                ),
                None => debug!("reconcile_discarded: scope={scope}"),
            }
        });
        Some(AbortOnDrop(handle))
    }

    async fn close_with_grace(&self, transport: &mut dyn Transport) {
        if timeout(self.config.close_grace, transport.close()).await.is_err() {
            debug!("ws_close_timeout: scope={}", self.scope);
        }
    }

    /// Queued frames never carry over to the next connection.
    fn drain_outbound(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("outbound_dropped: scope={} count={dropped}", self.scope);
        }
    }
}

async fn send_frame(transport: &mut dyn Transport, frame: &ClientFrame) -> Result<(), TransportError> {
    let text = encode_client_frame(frame).map_err(|err| TransportError::Send(err.to_string()))?;
    transport.send_text(text).await
}

/// Resolves once shutdown is signalled or the signalling side is gone.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
