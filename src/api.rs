//! REST client for projects, history, files, shares and templates
//!
//! These are plain request/response calls; nothing here touches session state.
//! Callers hand the results to [`Session::apply_project_detail`](crate::Session).

use crate::session::{Message, MessageKind, ProjectStatus};
use crate::{Result, TeamforgeConfig, TeamforgeError};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Max characters of a server error body kept in an error message
const MAX_ERROR_DETAIL_CHARS: usize = 500;

// ─── Response shapes ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub workspace_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ProjectInfo {
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectList {
    pub projects: Vec<ProjectInfo>,
    #[serde(default)]
    pub total: usize,
}

/// A stored history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub conversation_round: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_message_type() -> String {
    "agent_message".to_string()
}

impl PersistedMessage {
    /// Convert into a timeline message. A fresh client id is assigned.
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new(
            MessageKind::from_wire(&self.message_type),
            self.agent.clone(),
            self.content.clone(),
        )
        .with_project(self.project_id.clone())
        .with_round(self.conversation_round);
        if let Some(ts) = self.created_at.as_deref().and_then(parse_timestamp) {
            msg = msg.with_timestamp(ts);
        }
        msg
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<PersistedMessage>,
}

/// Project plus its full persisted history
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDetail {
    pub project: ProjectInfo,
    pub messages: Vec<PersistedMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub binary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareInfo {
    pub id: String,
    pub project_id: String,
    pub share_token: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    pub share_url: String,
}

#[derive(Debug, Deserialize)]
struct ShareStatusResponse {
    #[serde(default)]
    shared: bool,
    #[serde(default)]
    share: Option<ShareInfo>,
}

#[derive(Debug, Serialize)]
struct ShareRequest {
    is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub default_features: Vec<String>,
    #[serde(default)]
    pub suggested_features: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TemplatesResponse {
    #[serde(default)]
    templates: Vec<TemplateInfo>,
}

/// Parse a server timestamp: RFC 3339, or a naive ISO datetime taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

// ─── Client ──────────────────────────────────────────────────────────

/// REST client for the generation server
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &TeamforgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("teamforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TeamforgeError::Api(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn list_projects(&self, skip: usize, limit: usize) -> Result<ProjectList> {
        let url = format!("{}?skip={}&limit={}", self.endpoint("projects"), skip, limit);
        self.get_json(&url).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<ProjectInfo> {
        self.get_json(&self.endpoint(&format!("projects/{project_id}")))
            .await
    }

    pub async fn get_messages(&self, project_id: &str) -> Result<Vec<PersistedMessage>> {
        let resp: MessagesResponse = self
            .get_json(&self.endpoint(&format!("projects/{project_id}/messages")))
            .await?;
        Ok(resp.messages)
    }

    /// Fetch project info and history concurrently.
    pub async fn load_project_detail(&self, project_id: &str) -> Result<ProjectDetail> {
        let (project, messages) =
            tokio::try_join!(self.get_project(project_id), self.get_messages(project_id))?;
        Ok(ProjectDetail { project, messages })
    }

    pub async fn list_files(&self, project_id: &str) -> Result<FileListing> {
        self.get_json(&self.endpoint(&format!("projects/{project_id}/files")))
            .await
    }

    pub async fn file_content(&self, project_id: &str, path: &str) -> Result<FileContent> {
        let path = path.trim_start_matches('/');
        self.get_json(&self.endpoint(&format!("projects/{project_id}/files/{path}")))
            .await
    }

    pub async fn create_share(&self, project_id: &str) -> Result<ShareInfo> {
        let url = self.endpoint(&format!("projects/{project_id}/share"));
        debug!("POST {}", url);
        let request = self.authorize(self.client.post(&url)).json(&ShareRequest {
            is_public: true,
            expires_at: None,
        });
        let response = request.send().await.map_err(Self::map_reqwest_error)?;
        Self::decode(response).await
    }

    /// Current share link (with its view count), if the project is shared.
    pub async fn share_info(&self, project_id: &str) -> Result<Option<ShareInfo>> {
        let resp: ShareStatusResponse = self
            .get_json(&self.endpoint(&format!("projects/{project_id}/share")))
            .await?;
        Ok(if resp.shared { resp.share } else { None })
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateInfo>> {
        let resp: TemplatesResponse = self.get_json(&self.endpoint("templates")).await?;
        Ok(resp.templates)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let response = Self::check_response_status(response).await?;
        let body = response.text().await.map_err(Self::map_reqwest_error)?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = extract_error_detail(&body);
        if detail.is_empty() {
            return Err(TeamforgeError::Api(format!("HTTP {status}")));
        }
        Err(TeamforgeError::Api(format!("HTTP {status}: {detail}")))
    }

    fn map_reqwest_error(e: reqwest::Error) -> TeamforgeError {
        if e.is_timeout() {
            TeamforgeError::Api(format!("timeout: {e}"))
        } else if e.is_connect() {
            TeamforgeError::Api(format!("network: {e}"))
        } else {
            TeamforgeError::Api(e.to_string())
        }
    }
}

/// Pull a human-readable message out of an error body (`detail` or `message`).
fn extract_error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let detail = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .or_else(|| value.get("message"))
                .and_then(|d| d.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| trimmed.to_string());

    if detail.chars().count() <= MAX_ERROR_DETAIL_CHARS {
        return detail;
    }
    let mut truncated: String = detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect();
    truncated.push_str("... [truncated]");
    truncated
}
