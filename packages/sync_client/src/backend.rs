//! Persistence collaborator seam.

use std::future::Future;

use serde::Serialize;
use sync_protocol::{Conversation, Message, Participant};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Header carrying the caller identity on every REST call.
pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// The four operations the client core needs from persistence. Calls are
/// made on behalf of the participant the backend was built for.
pub trait ChatBackend: Send + Sync + 'static {
    /// Most recently active first.
    fn fetch_conversations(&self) -> impl Future<Output = Result<Vec<Conversation>>> + Send;

    /// Idempotent on the unordered pair; the returned record is authoritative.
    fn create_or_get_conversation(
        &self,
        recipient_id: &str,
    ) -> impl Future<Output = Result<Conversation>> + Send;

    /// Creation time ascending.
    fn fetch_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>>> + Send;

    fn create_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<Message>> + Send;
}

/// `ChatBackend` over the server's REST API.
#[derive(Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    participant_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationBody<'a> {
    recipient_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageBody<'a> {
    conversation_id: &'a str,
    content: &'a str,
}

impl RestBackend {
    pub fn new(config: &ClientConfig, participant_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base().to_string(),
            participant_id: participant_id.into(),
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register or update this participant's display profile.
    pub async fn update_profile(&self, name: &str, email: Option<&str>) -> Result<()> {
        let resp = self
            .http
            .put(self.url("/api/users/me"))
            .header(PARTICIPANT_HEADER, &self.participant_id)
            .json(&serde_json::json!({ "name": name, "email": email }))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let _: serde_json::Value = decode(resp).await?;
        Ok(())
    }

    /// Participants whose name or email contains `query`, excluding the caller.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Participant>> {
        let resp = self
            .http
            .get(self.url("/api/users/search"))
            .query(&[("query", query)])
            .header(PARTICIPANT_HEADER, &self.participant_id)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        decode(resp).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .header(PARTICIPANT_HEADER, &self.participant_id)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        decode(resp).await
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(self.url(path))
            .header(PARTICIPANT_HEADER, &self.participant_id)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        decode(resp).await
    }
}

/// Turn a non-success response into `ClientError::Backend`, using the
/// server's `{"message"}` body when there is one.
async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(ClientError::from_reqwest);
    }

    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    debug!(status = status.as_u16(), "Backend rejected request: {}", message);
    Err(ClientError::Backend {
        status: status.as_u16(),
        message,
    })
}

impl ChatBackend for RestBackend {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        self.get("/api/conversations").await
    }

    async fn create_or_get_conversation(&self, recipient_id: &str) -> Result<Conversation> {
        self.post("/api/conversations", &CreateConversationBody { recipient_id })
            .await
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.get(&format!("/api/messages/{conversation_id}")).await
    }

    async fn create_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        self.post(
            "/api/messages",
            &CreateMessageBody {
                conversation_id,
                content,
            },
        )
        .await
    }
}
