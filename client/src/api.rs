//! REST client for the message endpoints.

use async_trait::async_trait;
use campus_chat_protocol::{
    ErrorResponse, HistoryResponse, Message, PresenceResponse, SendMessageRequest,
    SendMessageResponse,
};
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// The server's REST surface as the chat UI uses it.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Full conversation with `peer`, oldest first.
    async fn fetch_history(&self, token: &str, peer: &str) -> Result<Vec<Message>, ClientError>;

    /// Send a message to `peer` and return it as stored.
    async fn send_message(
        &self,
        token: &str,
        peer: &str,
        request: &SendMessageRequest,
    ) -> Result<Message, ClientError>;

    /// Users currently holding a live connection.
    async fn fetch_presence(&self, token: &str) -> Result<Vec<String>, ClientError>;
}

/// `ChatApi` over HTTP with bearer auth.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base_url` extended by `segments`, each percent-encoded as one
    /// path segment.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Decode a success body, or turn an error status into `ClientError::Server`
/// using the `{ success: false, message }` body when present.
async fn read_body<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|e| ClientError::Decode(e.to_string()));
    }

    let message = match resp.json::<ErrorResponse>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    tracing::warn!(status = status.as_u16(), message = %message, "Chat API request failed");

    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_history(&self, token: &str, peer: &str) -> Result<Vec<Message>, ClientError> {
        let resp = self
            .client
            .get(self.url(&["api", "messages", peer])?)
            .bearer_auth(token)
            .send()
            .await?;

        let body: HistoryResponse = read_body(resp).await?;
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        token: &str,
        peer: &str,
        request: &SendMessageRequest,
    ) -> Result<Message, ClientError> {
        let resp = self
            .client
            .post(self.url(&["api", "messages", "send", peer])?)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let body: SendMessageResponse = read_body(resp).await?;
        Ok(body.message)
    }

    async fn fetch_presence(&self, token: &str) -> Result<Vec<String>, ClientError> {
        let resp = self
            .client
            .get(self.url(&["api", "presence"])?)
            .bearer_auth(token)
            .send()
            .await?;

        let body: PresenceResponse = read_body(resp).await?;
        Ok(body.connected_users)
    }
}
