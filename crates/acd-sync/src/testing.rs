//! In-memory transport and REST doubles for driving sessions under paused time.

use crate::api::{AgentStatusReport, ProjectApi, ProjectDetail};
use crate::error::{ApiError, TransportError};
use crate::transport::{CloseInfo, Connector, Transport, TransportEvent};
use acd_core::{AgentQuestion, AgentStatus, ProgressSnapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// Server end of one fake connection.
pub struct FakeServer {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl FakeServer {
    pub fn push(&self, raw: &str) {
        let _ = self.to_client.send(TransportEvent::Text(raw.to_string()));
    }

    pub fn close(&self, info: CloseInfo) {
        let _ = self.to_client.send(TransportEvent::Closed(info));
    }

    /// True once the client closed or dropped its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn take_sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            sent.push(text);
        }
        sent
    }
}

struct FakeTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    finished: Option<CloseInfo>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.finished.is_some() {
            return Err(TransportError::Send("connection closed".to_string()));
        }
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Send("server gone".to_string()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        if let Some(info) = &self.finished {
            return TransportEvent::Closed(info.clone());
        }
        let event = self
            .events
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed(CloseInfo::new(None, "server gone")));
        if let TransportEvent::Closed(info) = &event {
            self.finished = Some(info.clone());
        }
        event
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.finished
            .get_or_insert_with(|| CloseInfo::new(Some(1000), "client close"));
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ConnectorLog {
    opens: Vec<(Url, Instant)>,
    fail_remaining: usize,
}

pub struct FakeConnector {
    log: Mutex<ConnectorLog>,
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            log: Mutex::new(ConnectorLog::default()),
            servers,
        });
        (connector, rx)
    }

    /// The next `count` opens fail with a connect error.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_remaining = count;
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.lock().opens.iter().map(|(_, at)| *at).collect()
    }

    pub fn open_urls(&self) -> Vec<Url> {
        self.lock().opens.iter().map(|(url, _)| url.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectorLog> {
        self.log.lock().expect("connector log poisoned")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        {
            let mut log = self.lock();
            log.opens.push((url.clone(), Instant::now()));
            if log.fail_remaining > 0 {
                log.fail_remaining -= 1;
                return Err(TransportError::Connect("connection refused".to_string()));
            }
        }
        let (to_client, events) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.servers.send(FakeServer {
            to_client,
            from_client,
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(FakeTransport {
            events,
            outbound,
            closed,
            finished: None,
        }))
    }
}

struct FakeApiState {
    status: AgentStatus,
    progress: ProgressSnapshot,
    question: Option<AgentQuestion>,
    answers: Vec<(String, String, String)>,
}

/// Answers every REST call from canned values.
pub struct FakeApi {
    state: Mutex<FakeApiState>,
    fetches: AtomicUsize,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeApiState {
                status: AgentStatus::Stopped,
                progress: ProgressSnapshot {
                    passing: 4,
                    in_progress: 1,
                    total: 10,
                    percentage: 40.0,
                },
                question: None,
                answers: Vec::new(),
            }),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl FakeApi {
    pub fn set_status(&self, status: AgentStatus) {
        self.lock().status = status;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn answers(&self) -> Vec<(String, String, String)> {
        self.lock().answers.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeApiState> {
        self.state.lock().expect("fake api poisoned")
    }
}

#[async_trait]
impl ProjectApi for FakeApi {
    async fn project_detail(&self, scope: &str) -> Result<ProjectDetail, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ProjectDetail {
            name: scope.to_string(),
            path: format!("/srv/{scope}"),
            has_spec: true,
            stats: self.lock().progress,
        })
    }

    async fn agent_status(&self, _scope: &str) -> Result<AgentStatusReport, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(AgentStatusReport {
            status: self.lock().status,
            pid: None,
            started_at: None,
            yolo_mode: false,
            model: None,
        })
    }

    async fn pending_question(&self, _scope: &str) -> Result<Option<AgentQuestion>, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().question.clone())
    }

    async fn answer_question(&self, scope: &str, id: &str, answer: &str) -> Result<(), ApiError> {
        self.lock()
            .answers
            .push((scope.to_string(), id.to_string(), answer.to_string()));
        Ok(())
    }
}
