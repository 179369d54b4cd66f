//! Scripted in-memory feed sources for engine tests.

use std::collections::{HashMap, VecDeque};

use crate::feed::{
    DeltaAction, EventBatch, EventId, EventSource, FeedError, LatestResponse, MessageDelta,
    MessageFetch, MessageId, MessagePatch, MessageSource, RemoteMessage, RemoteMessageBuilder,
    code,
};

/// Feed double fed from per-call queues; panics when a test forgets to
/// script a response.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    pub latest: VecDeque<Result<LatestResponse, FeedError>>,
    pub batches: VecDeque<Result<EventBatch, FeedError>>,
    pub fetches: HashMap<String, VecDeque<Result<MessageFetch, FeedError>>>,
    pub checked: Vec<EventId>,
    pub fetched: Vec<MessageId>,
}

impl ScriptedSource {
    pub fn transport_error() -> FeedError {
        FeedError::UnexpectedStatus {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            endpoint: "scripted".to_string(),
        }
    }

    pub fn script_latest(&mut self, event_id: &str) {
        self.latest.push_back(Ok(LatestResponse {
            code: code::SUCCESS,
            event_id: event_id.try_into().expect("scripted event id should be valid"),
        }));
    }

    pub fn script_batch(&mut self, batch: EventBatch) {
        self.batches.push_back(Ok(batch));
    }

    pub fn script_fetch(&mut self, id: &str, fetch: Result<MessageFetch, FeedError>) {
        self.fetches.entry(id.to_string()).or_default().push_back(fetch);
    }
}

impl EventSource for ScriptedSource {
    async fn latest(&mut self) -> Result<LatestResponse, FeedError> {
        self.latest
            .pop_front()
            .expect("scripted latest response should be queued")
    }

    async fn check(&mut self, cursor: &EventId) -> Result<EventBatch, FeedError> {
        self.checked.push(cursor.clone());
        self.batches
            .pop_front()
            .expect("scripted batch response should be queued")
    }
}

impl MessageSource for ScriptedSource {
    async fn fetch_message(&mut self, id: &MessageId) -> Result<MessageFetch, FeedError> {
        self.fetched.push(id.clone());
        self.fetches
            .get_mut(id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("scripted fetch response should be queued for {id}"))
    }
}

pub(crate) fn empty_batch(event_id: &str) -> EventBatch {
    EventBatch {
        code: code::SUCCESS,
        has_more: false,
        event_id: event_id.try_into().expect("test event id should be valid"),
        refresh: 0,
        message_updates: Vec::new(),
        conversation_updates: Vec::new(),
        contact_updates: Vec::new(),
        contact_emails_updates: Vec::new(),
        label_updates: Vec::new(),
        user_updates: None,
        user_settings_updates: None,
        mail_settings_updates: None,
        addresses: None,
        message_counts: Vec::new(),
        conversation_counts: Vec::new(),
        used_space: None,
    }
}

pub(crate) fn message_delta(id: &str, action: DeltaAction) -> MessageDelta {
    MessageDelta {
        id: id.into(),
        action,
        message: None,
        patch: MessagePatch::default(),
    }
}

pub(crate) fn remote_message(id: &str, time: i64) -> RemoteMessage {
    RemoteMessageBuilder::default()
        .id(MessageId::from(id))
        .subject(format!("subject {id}"))
        .time(time)
        .body(Some(format!("body {id} at {time}")))
        .build()
        .expect("test message should build")
}
