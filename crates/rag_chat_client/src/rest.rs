//! Typed HTTP client for the query/conversation REST endpoints.
//! Only the response shapes matter here; the backend is opaque.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::citations::Citation;

/// REST request error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// Response to query submission: the backend assigns the turn id and confirms
/// (or creates) the session.
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySubmission {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(alias = "turnId")]
    pub turn_id: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// One stored query/response pair from conversation history.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRecord {
    pub turn_id: String,
    pub query: String,
    pub response: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
}

/// Session metadata as listed by `/api/conversations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub turn_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_active: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConversationListResponse {
    #[serde(default)]
    sessions: Vec<ConversationSummary>,
}

/// Full history of one conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDetail {
    pub session: ConversationSummary,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
    #[serde(default)]
    pub turn_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TitleResponse {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// HTTP client for the REST collaborators, addressed relative to one base URL.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Submit a query, creating a new turn (and, when `session_id` is `None`,
    /// a new session). No stream is opened when this fails.
    pub async fn submit_query(
        &self,
        session_id: Option<&str>,
        query: &str,
    ) -> Result<QuerySubmission, ApiError> {
        let body = QueryRequest { query, session_id };
        let resp = self
            .client
            .post(self.url("/query"))
            .json(&body)
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let resp = self.client.get(self.url("/conversations")).send().await?;
        let list: ConversationListResponse = parse_response(resp).await?;
        Ok(list.sessions)
    }

    pub async fn conversation_detail(
        &self,
        session_id: &str,
    ) -> Result<ConversationDetail, ApiError> {
        let resp = self
            .client
            .get(self.url(&format!("/conversations/{}", session_id)))
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn delete_conversation(&self, session_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.url(&format!("/conversations/{}", session_id)))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    pub async fn generate_title(&self, session_id: &str) -> Result<TitleResponse, ApiError> {
        let resp = self
            .client
            .post(self.url(&format!("/conversations/{}/generate-title", session_id)))
            .send()
            .await?;
        parse_response(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    // Error bodies carry a "detail" field when the backend produced them.
    let detail = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| status.to_string());
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let resp = check_status(resp).await?;
    Ok(resp.json::<T>().await?)
}
