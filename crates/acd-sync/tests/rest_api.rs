use acd_core::{AgentStatus, ProgressSnapshot};
use acd_sync::{fetch_reconciliation, ApiError, ProjectApi, RestProjectApi};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
struct Recorded {
    method: String,
    path: String,
    body: String,
}

type Route = fn(&str, &str) -> (u16, String);

/// Minimal HTTP/1.1 responder: one request per connection, replies decided
/// by `route(method, path)`.
struct HttpStub {
    origin: Url,
    seen: Arc<Mutex<Vec<Recorded>>>,
}

impl HttpStub {
    async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(respond(stream, route, log));
            }
        });
        Self {
            origin: Url::parse(&format!("http://{addr}")).expect("origin"),
            seen,
        }
    }

    fn api(&self) -> RestProjectApi {
        RestProjectApi::new(self.origin.clone())
    }

    fn seen(&self) -> Vec<Recorded> {
        self.seen.lock().expect("log").clone()
    }

    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.seen().into_iter().map(|r| r.path).collect();
        paths.sort();
        paths
    }
}

/// Records the request before replying, so callers see it once the reply lands.
async fn respond(mut stream: TcpStream, route: Route, log: Arc<Mutex<Vec<Recorded>>>) -> Option<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let (status, reply) = route(&method, &path);
    log.lock().expect("log").push(Recorded { method, path, body });
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
        reason(status),
        reply.len()
    );
    stream.write_all(response.as_bytes()).await.ok()?;
    let _ = stream.shutdown().await;
    Some(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    timeout(Duration::from_secs(5), fut).await.expect("timed out")
}

fn dashboard(method: &str, path: &str) -> (u16, String) {
    let body = match (method, path) {
        ("GET", "/api/projects/alpha") => {
            r#"{"name":"alpha","path":"/srv/alpha","has_spec":true,"stats":{"passing":3,"in_progress":1,"total":8,"percentage":37.5}}"#
        }
        ("GET", "/api/projects/alpha/agent/status") => {
            r#"{"status":"paused","pid":4242,"started_at":"2026-02-07T21:00:00","yolo_mode":true,"model":"opus"}"#
        }
        ("GET", "/api/projects/alpha/questions/pending") => {
            r#"{"question":{"id":"q-1","question":"Use sqlite?","options":["yes","no"],"timestamp":"2026-02-07T21:00:00"}}"#
        }
        ("GET", "/api/projects/quiet/questions/pending") => r#"{"question":null}"#,
        ("POST", "/api/projects/alpha/questions/q-1/answer") => r#"{"success":true}"#,
        ("POST", _) => return (404, r#"{"detail":"Question not found"}"#.to_string()),
        _ => return (500, "upstream exploded".to_string()),
    };
    (200, body.to_string())
}

#[tokio::test]
async fn reads_detail_and_status_from_their_paths() {
    let stub = HttpStub::start(dashboard).await;
    let api = stub.api();

    let detail = within(api.project_detail("alpha")).await.expect("detail");
    assert_eq!(detail.name, "alpha");
    assert!(detail.has_spec);
    assert_eq!(
        detail.stats,
        ProgressSnapshot {
            passing: 3,
            in_progress: 1,
            total: 8,
            percentage: 37.5,
        }
    );

    let report = within(api.agent_status("alpha")).await.expect("status");
    assert_eq!(report.status, AgentStatus::Paused);
    assert_eq!(report.pid, Some(4242));
    assert!(report.yolo_mode);

    assert_eq!(
        stub.paths(),
        vec![
            "/api/projects/alpha".to_string(),
            "/api/projects/alpha/agent/status".to_string(),
        ]
    );
}

#[tokio::test]
async fn pending_question_may_be_absent() {
    let stub = HttpStub::start(dashboard).await;
    let api = stub.api();

    let question = within(api.pending_question("alpha"))
        .await
        .expect("pending")
        .expect("a question");
    assert_eq!(question.id, "q-1");
    assert_eq!(question.options, Some(vec!["yes".to_string(), "no".to_string()]));

    assert!(within(api.pending_question("quiet")).await.expect("pending").is_none());
    assert_eq!(
        stub.paths(),
        vec![
            "/api/projects/alpha/questions/pending".to_string(),
            "/api/projects/quiet/questions/pending".to_string(),
        ]
    );
}

#[tokio::test]
async fn answer_posts_json_to_the_question_path() {
    let stub = HttpStub::start(dashboard).await;
    within(stub.api().answer_question("alpha", "q-1", "yes"))
        .await
        .expect("answer");

    let seen = stub.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/api/projects/alpha/questions/q-1/answer");
    let body: serde_json::Value = serde_json::from_str(&seen[0].body).expect("json body");
    assert_eq!(body, serde_json::json!({ "answer": "yes" }));
}

#[tokio::test]
async fn error_replies_keep_the_server_detail() {
    let stub = HttpStub::start(dashboard).await;
    let api = stub.api();

    match within(api.answer_question("alpha", "q-404", "yes")).await {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Question not found");
        }
        other => panic!("expected a 404, got {other:?}"),
    }

    match within(api.agent_status("beta")).await {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 500);
            assert_eq!(detail, "upstream exploded");
        }
        other => panic!("expected a 500, got {other:?}"),
    }
}

#[tokio::test]
async fn reconciliation_survives_one_failing_endpoint() {
    fn status_down(method: &str, path: &str) -> (u16, String) {
        if path.ends_with("/agent/status") {
            return (500, r#"{"detail":"agent manager unavailable"}"#.to_string());
        }
        dashboard(method, path)
    }
    let stub = HttpStub::start(status_down).await;
    let api = stub.api();

    let fetched = within(fetch_reconciliation(&api, "alpha")).await;
    assert_eq!(fetched.agent_status, None);
    assert_eq!(fetched.progress.map(|p| p.total), Some(8));
    let question = fetched.pending_question.expect("fetched").expect("a question");
    assert_eq!(question.id, "q-1");
    assert_eq!(stub.paths().len(), 3);
}
