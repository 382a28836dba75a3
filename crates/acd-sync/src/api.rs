use crate::endpoint::project_api_url;
use crate::error::ApiError;
use acd_core::{AgentQuestion, AgentStatus, ProgressSnapshot, Reconciliation};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProjectDetail {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub has_spec: bool,
    pub stats: ProgressSnapshot,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentStatusReport {
    pub status: AgentStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub yolo_mode: bool,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PendingQuestionBody {
    question: Option<AgentQuestion>,
}

#[derive(Debug, Serialize)]
struct AnswerBody<'a> {
    answer: &'a str,
}

/// Request/response side channel of the dashboard server.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn project_detail(&self, scope: &str) -> Result<ProjectDetail, ApiError>;
    async fn agent_status(&self, scope: &str) -> Result<AgentStatusReport, ApiError>;
    async fn pending_question(&self, scope: &str) -> Result<Option<AgentQuestion>, ApiError>;
    async fn answer_question(&self, scope: &str, id: &str, answer: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct RestProjectApi {
    client: Client,
    origin: Url,
}

impl RestProjectApi {
    pub fn new(origin: Url) -> Self {
        Self::with_client(Client::new(), origin)
    }

    pub fn with_client(client: Client, origin: Url) -> Self {
        Self { client, origin }
    }

    fn url(&self, scope: &str, tail: &[&str]) -> Result<Url, ApiError> {
        Ok(project_api_url(&self.origin, scope, tail)?)
    }
}

/// Maps non-2xx replies to `ApiError::Status`, keeping the server's `detail`
/// message when the body carries one.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[async_trait]
impl ProjectApi for RestProjectApi {
    async fn project_detail(&self, scope: &str) -> Result<ProjectDetail, ApiError> {
        let url = self.url(scope, &[])?;
        let response = check(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn agent_status(&self, scope: &str) -> Result<AgentStatusReport, ApiError> {
        let url = self.url(scope, &["agent", "status"])?;
        let response = check(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn pending_question(&self, scope: &str) -> Result<Option<AgentQuestion>, ApiError> {
        let url = self.url(scope, &["questions", "pending"])?;
        let response = check(self.client.get(url).send().await?).await?;
        let body: PendingQuestionBody = response.json().await?;
        Ok(body.question)
    }

    async fn answer_question(&self, scope: &str, id: &str, answer: &str) -> Result<(), ApiError> {
        let url = self.url(scope, &["questions", id, "answer"])?;
        check(self.client.post(url).json(&AnswerBody { answer }).send().await?).await?;
        Ok(())
    }
}

/// Fetches the three authoritative fields concurrently. A failed fetch leaves
/// its field unset so the rest still reconcile.
pub async fn fetch_reconciliation(api: &dyn ProjectApi, scope: &str) -> Reconciliation {
    let (detail, status, question) = tokio::join!(
        api.project_detail(scope),
        api.agent_status(scope),
        api.pending_question(scope),
    );
    Reconciliation {
        progress: detail
            .map(|detail| detail.stats)
            .map_err(|err| warn!("reconcile_progress_failed: scope={scope} {err}"))
            .ok(),
        agent_status: status
            .map(|report| report.status)
            .map_err(|err| warn!("reconcile_status_failed: scope={scope} {err}"))
            .ok(),
        pending_question: question
            .map_err(|err| warn!("reconcile_question_failed: scope={scope} {err}"))
            .ok(),
    }
}
