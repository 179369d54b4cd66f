use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::feed::{EventBatch, EventId, LatestResponse, MessageId, RemoteMessage, code};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status {status} from {endpoint}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        endpoint: String,
    },
    #[error("remote returned code {0}")]
    Code(u32),
    #[error("remote response missing expected payload")]
    MissingPayload,
}

/// Outcome of a full-message fetch during staging. Transport and server
/// errors are `Err` on the call itself; `Unavailable` is the application
/// telling us the message is gone or off-limits.
#[derive(Debug)]
pub enum MessageFetch {
    Fetched(Box<RemoteMessage>),
    Unavailable(u32),
}

/// The change feed proper: two calls, both resumable from an opaque cursor.
pub trait EventSource {
    async fn latest(&mut self) -> Result<LatestResponse, FeedError>;
    async fn check(&mut self, cursor: &EventId) -> Result<EventBatch, FeedError>;
}

/// Authoritative message endpoint, used to materialize sparse update deltas.
pub trait MessageSource {
    async fn fetch_message(&mut self, id: &MessageId) -> Result<MessageFetch, FeedError>;
}

pub struct HttpGateway {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    code: u32,
    #[serde(rename = "message")]
    message: Option<RemoteMessage>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FeedError> {
        let endpoint = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        debug!("GET {endpoint}");
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedError::UnexpectedStatus {
                status: response.status(),
                endpoint,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl EventSource for HttpGateway {
    async fn latest(&mut self) -> Result<LatestResponse, FeedError> {
        self.get_json("events/latest").await
    }

    async fn check(&mut self, cursor: &EventId) -> Result<EventBatch, FeedError> {
        self.get_json(&format!("events/{cursor}")).await
    }
}

impl MessageSource for HttpGateway {
    async fn fetch_message(&mut self, id: &MessageId) -> Result<MessageFetch, FeedError> {
        let envelope: MessageEnvelope = self.get_json(&format!("mail/messages/{id}")).await?;
        if code::is_success(envelope.code) {
            let message = envelope.message.ok_or(FeedError::MissingPayload)?;
            Ok(MessageFetch::Fetched(Box::new(message)))
        } else if code::drops_single_message(envelope.code) {
            Ok(MessageFetch::Unavailable(envelope.code))
        } else {
            Err(FeedError::Code(envelope.code))
        }
    }
}
