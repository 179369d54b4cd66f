use enumflags2::{BitFlags, bitflags};
use serde::Deserialize;

use crate::feed::{
    Contact, ContactEmail, ContactId, Conversation, EventId, Label, LabelId, MessageId,
    MessagePatch, RemoteMessage,
};

/// Action kind of one delta. Closed over the codes the feed documents today;
/// anything else lands in `Unknown` and is applied as a no-op so newer feed
/// versions stay consumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum DeltaAction {
    Delete,
    Create,
    Update,
    UpdateFlags,
    Unknown(u8),
}

impl From<u8> for DeltaAction {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Delete,
            1 => Self::Create,
            2 => Self::Update,
            3 => Self::UpdateFlags,
            other => Self::Unknown(other),
        }
    }
}

impl DeltaAction {
    /// Raw wire code; the apply order sorts on this, descending.
    pub fn code(self) -> u8 {
        match self {
            Self::Delete => 0,
            Self::Create => 1,
            Self::Update => 2,
            Self::UpdateFlags => 3,
            Self::Unknown(code) => code,
        }
    }
}

/// Entities the feed asks the client to rebuild from scratch instead of
/// patching incrementally.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Refresh {
    Mail = 1,
    Contacts = 1 << 1,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDelta {
    #[serde(rename = "ID")]
    pub id: MessageId,
    #[serde(rename = "action")]
    pub action: DeltaAction,
    /// Full payload, present on create deltas.
    #[serde(rename = "message")]
    pub message: Option<RemoteMessage>,
    #[serde(flatten)]
    pub patch: MessagePatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelDelta {
    #[serde(rename = "ID")]
    pub id: LabelId,
    #[serde(rename = "action")]
    pub action: DeltaAction,
    #[serde(rename = "label")]
    pub label: Option<Label>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactDelta {
    #[serde(rename = "ID")]
    pub id: ContactId,
    #[serde(rename = "action")]
    pub action: DeltaAction,
    #[serde(rename = "contact")]
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactEmailDelta {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "action")]
    pub action: DeltaAction,
    #[serde(rename = "contactEmail")]
    pub contact_email: Option<ContactEmail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDelta {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "action")]
    pub action: DeltaAction,
    #[serde(rename = "conversation")]
    pub conversation: Option<Conversation>,
}

/// Unread counter entry; the feed always sends the authoritative value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CountEntry {
    #[serde(rename = "LabelID")]
    pub label_id: LabelId,
    #[serde(rename = "Total", default)]
    pub total: i64,
    #[serde(rename = "Unread", default)]
    pub unread: i64,
}

/// One page of the change feed, `GET /events/{cursor}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBatch {
    pub code: u32,
    #[serde(default)]
    pub has_more: bool,
    #[serde(rename = "eventID")]
    pub event_id: EventId,
    #[serde(default)]
    pub refresh: u8,
    #[serde(rename = "messageUpdates", default)]
    pub message_updates: Vec<MessageDelta>,
    #[serde(rename = "conversationUpdates", default)]
    pub conversation_updates: Vec<ConversationDelta>,
    #[serde(rename = "contactUpdates", default)]
    pub contact_updates: Vec<ContactDelta>,
    #[serde(rename = "contactEmailsUpdates", default)]
    pub contact_emails_updates: Vec<ContactEmailDelta>,
    #[serde(rename = "labelUpdates", default)]
    pub label_updates: Vec<LabelDelta>,
    #[serde(rename = "userUpdates")]
    pub user_updates: Option<serde_json::Value>,
    #[serde(rename = "userSettingsUpdates")]
    pub user_settings_updates: Option<serde_json::Value>,
    #[serde(rename = "mailSettingsUpdates")]
    pub mail_settings_updates: Option<serde_json::Value>,
    pub addresses: Option<Vec<serde_json::Value>>,
    #[serde(rename = "messageCounts", default)]
    pub message_counts: Vec<CountEntry>,
    #[serde(rename = "conversationCounts", default)]
    pub conversation_counts: Vec<CountEntry>,
    #[serde(rename = "usedSpace")]
    pub used_space: Option<i64>,
}

impl EventBatch {
    pub fn refresh_flags(&self) -> BitFlags<Refresh> {
        BitFlags::from_bits_truncate(self.refresh)
    }
}

/// Baseline cursor response, `GET /events/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestResponse {
    pub code: u32,
    #[serde(rename = "eventID")]
    pub event_id: EventId,
}
