use derive_builder::Builder;
use derive_getters::Getters;
use enumflags2::BitFlags;
use serde::Deserialize;

use crate::feed::{AddressId, ContactId, LabelId, MessageFlag, MessageId};

/// Full message record as returned by the message endpoint and embedded in
/// create deltas.
#[derive(Debug, Clone, Deserialize, Getters, Builder)]
#[builder(setter(into))]
pub struct RemoteMessage {
    #[serde(rename = "ID")]
    id: MessageId,
    #[serde(rename = "Subject", default)]
    #[builder(default)]
    subject: String,
    #[serde(rename = "Unread", default)]
    #[builder(default)]
    unread: bool,
    #[serde(rename = "Sender", default)]
    #[builder(default)]
    sender: String,
    #[serde(rename = "ToList", default)]
    #[builder(default)]
    to_list: Vec<String>,
    #[serde(rename = "CCList", default)]
    #[builder(default)]
    cc_list: Vec<String>,
    #[serde(rename = "BCCList", default)]
    #[builder(default)]
    bcc_list: Vec<String>,
    #[serde(rename = "Time", default)]
    #[builder(default)]
    time: i64,
    #[serde(rename = "Size", default)]
    #[builder(default)]
    size: i64,
    #[serde(rename = "NumAttachments", default)]
    #[builder(default)]
    num_attachments: i64,
    #[serde(rename = "ExpirationTime", default)]
    #[builder(default)]
    expiration_time: i64,
    #[serde(rename = "Flags", default)]
    #[builder(default)]
    flags: u64,
    #[serde(rename = "AddressID", default)]
    #[builder(default)]
    address_id: Option<AddressId>,
    #[serde(rename = "LabelIDs", default)]
    #[builder(default)]
    label_ids: Vec<LabelId>,
    #[serde(rename = "Body", default)]
    #[builder(default)]
    body: Option<String>,
    #[serde(rename = "Attachments", default)]
    #[builder(default)]
    attachments: Vec<RemoteAttachment>,
}

impl RemoteMessage {
    pub fn flag_bits(&self) -> BitFlags<MessageFlag> {
        BitFlags::from_bits_truncate(self.flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAttachment {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Size", default)]
    pub size: i64,
}

fn no_size_change() -> i64 {
    0
}

fn no_expiration_change() -> i64 {
    -1
}

/// Sparse patch carried by update / update-flags deltas. A field holding its
/// sentinel ("absent") value leaves the local record untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePatch {
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "Unread")]
    pub unread: Option<bool>,
    #[serde(rename = "Sender")]
    pub sender: Option<String>,
    #[serde(rename = "ToList")]
    pub to_list: Option<Vec<String>>,
    #[serde(rename = "CCList")]
    pub cc_list: Option<Vec<String>>,
    #[serde(rename = "BCCList")]
    pub bcc_list: Option<Vec<String>>,
    #[serde(rename = "Time")]
    pub time: Option<i64>,
    #[serde(rename = "Size", default = "no_size_change")]
    pub size: i64,
    #[serde(rename = "NumAttachments", default = "no_size_change")]
    pub num_attachments: i64,
    #[serde(rename = "ExpirationTime", default = "no_expiration_change")]
    pub expiration_time: i64,
    #[serde(rename = "Flags")]
    pub flags: Option<u64>,
    #[serde(rename = "AddressID")]
    pub address_id: Option<AddressId>,
    #[serde(rename = "LabelIDs")]
    pub label_ids: Option<Vec<LabelId>>,
    #[serde(rename = "LabelIDsAdded")]
    pub label_ids_added: Option<Vec<LabelId>>,
    #[serde(rename = "LabelIDsRemoved")]
    pub label_ids_removed: Option<Vec<LabelId>>,
}

impl Default for MessagePatch {
    /// Every field at its "no change" sentinel.
    fn default() -> Self {
        Self {
            subject: None,
            unread: None,
            sender: None,
            to_list: None,
            cc_list: None,
            bcc_list: None,
            time: None,
            size: no_size_change(),
            num_attachments: no_size_change(),
            expiration_time: no_expiration_change(),
            flags: None,
            address_id: None,
            label_ids: None,
            label_ids_added: None,
            label_ids_removed: None,
        }
    }
}

impl MessagePatch {
    /// Lightweight staged record for update-flags deltas: everything the
    /// delta carries, defaults elsewhere. Never fetched from the network.
    pub fn to_skeleton(&self, id: &MessageId) -> RemoteMessage {
        RemoteMessage {
            id: id.clone(),
            subject: self.subject.clone().unwrap_or_default(),
            unread: self.unread.unwrap_or_default(),
            sender: self.sender.clone().unwrap_or_default(),
            to_list: self.to_list.clone().unwrap_or_default(),
            cc_list: self.cc_list.clone().unwrap_or_default(),
            bcc_list: self.bcc_list.clone().unwrap_or_default(),
            time: self.time.unwrap_or_default(),
            size: self.size.max(0),
            num_attachments: self.num_attachments.max(0),
            expiration_time: if self.expiration_time < 0 {
                0
            } else {
                self.expiration_time
            },
            flags: self.flags.unwrap_or_default(),
            address_id: self.address_id.clone(),
            label_ids: self.label_ids.clone().unwrap_or_default(),
            body: None,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum LabelKind {
    #[default]
    Label,
    ContactGroup,
    Folder,
}

impl From<u8> for LabelKind {
    fn from(value: u8) -> Self {
        match value {
            2 => Self::ContactGroup,
            3 => Self::Folder,
            _ => Self::Label,
        }
    }
}

impl From<LabelKind> for u8 {
    fn from(value: LabelKind) -> Self {
        match value {
            LabelKind::Label => 1,
            LabelKind::ContactGroup => 2,
            LabelKind::Folder => 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    #[serde(rename = "ID")]
    pub id: LabelId,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Color", default)]
    pub color: String,
    #[serde(rename = "Type", default)]
    pub kind: LabelKind,
    #[serde(rename = "Order", default)]
    pub order: i64,
}

/// Contact payload; `data` is an opaque (typically encrypted) blob that the
/// engine stores without interpreting.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    #[serde(rename = "ID")]
    pub id: ContactId,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Data", default)]
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactEmail {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ContactID")]
    pub contact_id: ContactId,
    #[serde(rename = "Email", default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Subject", default)]
    pub subject: String,
    #[serde(rename = "NumUnread", default)]
    pub num_unread: i64,
}
