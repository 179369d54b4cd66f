use enumflags2::BitFlags;
use log::trace;
use rusqlite::{OptionalExtension, Row, types::Type};

use crate::{
    feed::{
        AddressId, Encryption, LabelId, LabelKind, MessageFlag, MessageId, RemoteAttachment,
        RemoteMessage,
    },
    replica::{Replica, StoreError},
};

/// Mailbox location cached on every message; a pure function of the label
/// set (recomputed whenever labels change incrementally).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Inbox,
    AllDrafts,
    AllSent,
    Trash,
    Spam,
    AllMail,
    Archive,
    Sent,
    Drafts,
    Starred,
    /// A user-created folder label.
    Folder,
}

impl Location {
    pub fn code(self) -> i64 {
        match self {
            Self::Inbox => 0,
            Self::AllDrafts => 1,
            Self::AllSent => 2,
            Self::Trash => 3,
            Self::Spam => 4,
            Self::AllMail => 5,
            Self::Archive => 6,
            Self::Sent => 7,
            Self::Drafts => 8,
            Self::Starred => 10,
            Self::Folder => 999,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Inbox,
            1 => Self::AllDrafts,
            2 => Self::AllSent,
            3 => Self::Trash,
            4 => Self::Spam,
            6 => Self::Archive,
            7 => Self::Sent,
            8 => Self::Drafts,
            10 => Self::Starred,
            999 => Self::Folder,
            _ => Self::AllMail,
        }
    }

    /// System labels that pin a message to exactly one mailbox. All-mail and
    /// starred are views, not locations.
    fn from_system_label(id: &LabelId) -> Option<Self> {
        match id.as_str() {
            "0" => Some(Self::Inbox),
            "1" => Some(Self::AllDrafts),
            "2" => Some(Self::AllSent),
            "3" => Some(Self::Trash),
            "4" => Some(Self::Spam),
            "6" => Some(Self::Archive),
            "7" => Some(Self::Sent),
            "8" => Some(Self::Drafts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub id: MessageId,
    pub subject: String,
    pub unread: bool,
    pub sender: String,
    pub to_list: Vec<String>,
    pub cc_list: Vec<String>,
    pub bcc_list: Vec<String>,
    pub time: i64,
    pub size: i64,
    pub num_attachments: i64,
    pub expiration_time: i64,
    pub flags: BitFlags<MessageFlag>,
    pub address_id: Option<AddressId>,
    pub label_ids: Vec<LabelId>,
    pub location: Location,
    pub body: Option<String>,
}

impl LocalMessage {
    pub fn from_remote(remote: &RemoteMessage, location: Location) -> Self {
        Self {
            id: remote.id().clone(),
            subject: remote.subject().clone(),
            unread: remote.unread(),
            sender: remote.sender().clone(),
            to_list: remote.to_list().clone(),
            cc_list: remote.cc_list().clone(),
            bcc_list: remote.bcc_list().clone(),
            time: remote.time(),
            size: remote.size(),
            num_attachments: remote.num_attachments(),
            expiration_time: remote.expiration_time(),
            flags: remote.flag_bits(),
            address_id: remote.address_id().clone(),
            label_ids: remote.label_ids().clone(),
            location,
            body: remote.body().clone(),
        }
    }

    pub fn is_replied(&self) -> bool {
        self.flags.contains(MessageFlag::Replied)
    }

    pub fn is_replied_all(&self) -> bool {
        self.flags.contains(MessageFlag::RepliedAll)
    }

    pub fn is_forwarded(&self) -> bool {
        self.flags.contains(MessageFlag::Forwarded)
    }

    pub fn encryption(&self) -> Encryption {
        Encryption::from_flags(self.flags)
    }
}

fn encode_list<T: serde::Serialize>(list: &[T]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(list)?)
}

fn decode_list(index: usize, raw: &str) -> Result<Vec<String>, rusqlite::Error> {
    serde_json::from_str(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

impl TryFrom<&Row<'_>> for LocalMessage {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let flags: i64 = row.get(11)?;
        let address_id: Option<String> = row.get(12)?;
        Ok(Self {
            id: MessageId::from(row.get::<_, String>(0)?),
            subject: row.get(1)?,
            unread: row.get(2)?,
            sender: row.get(3)?,
            to_list: decode_list(4, &row.get::<_, String>(4)?)?,
            cc_list: decode_list(5, &row.get::<_, String>(5)?)?,
            bcc_list: decode_list(6, &row.get::<_, String>(6)?)?,
            time: row.get(7)?,
            size: row.get(8)?,
            num_attachments: row.get(9)?,
            expiration_time: row.get(10)?,
            flags: BitFlags::from_bits_truncate(flags.cast_unsigned()),
            address_id: address_id.map(AddressId::from),
            label_ids: decode_list(13, &row.get::<_, String>(13)?)?
                .into_iter()
                .map(LabelId::from)
                .collect(),
            location: Location::from_code(row.get(14)?),
            body: row.get(15)?,
        })
    }
}

impl Replica {
    pub async fn save_message(&self, message: &LocalMessage) -> Result<(), StoreError> {
        trace!("saving message {}", message.id);
        let label_ids: Vec<&str> = message.label_ids.iter().map(LabelId::as_str).collect();
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into messages (id, subject, unread, sender, to_list, cc_list,
            bcc_list, time, size, num_attachments, expiration_time, flags, address_id,
            label_ids, location, body)
            values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )?;
        stmt.execute(rusqlite::params![
            message.id.as_str(),
            message.subject,
            message.unread,
            message.sender,
            encode_list(&message.to_list)?,
            encode_list(&message.cc_list)?,
            encode_list(&message.bcc_list)?,
            message.time,
            message.size,
            message.num_attachments,
            message.expiration_time,
            message.flags.bits().cast_signed(),
            message.address_id.as_ref().map(AddressId::as_str),
            encode_list(&label_ids)?,
            message.location.code(),
            message.body,
        ])?;
        Ok(())
    }

    pub async fn find_message(&self, id: &MessageId) -> Result<Option<LocalMessage>, StoreError> {
        trace!("looking up message {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("select * from messages where id = ?1")?;
        Ok(stmt
            .query_one([id.as_str()], |row| LocalMessage::try_from(row))
            .optional()?)
    }

    pub async fn delete_message(&self, id: &MessageId) -> Result<(), StoreError> {
        trace!("deleting message {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from messages where id = ?1")?;
        stmt.execute([id.as_str()])?;
        Ok(())
    }

    pub async fn clear_messages(&self) -> Result<(), StoreError> {
        trace!("clearing message cache");
        let db = self.lock().await;
        db.execute_batch("delete from messages; delete from attachments;")?;
        Ok(())
    }

    pub async fn replace_attachments(
        &self,
        id: &MessageId,
        attachments: &[RemoteAttachment],
    ) -> Result<(), StoreError> {
        trace!("replacing attachments of {id}");
        let db = self.lock().await;
        let mut delete = db.prepare_cached("delete from attachments where message_id = ?1")?;
        delete.execute([id.as_str()])?;
        let mut insert = db.prepare_cached(
            "insert into attachments (id, message_id, name, size) values (?1, ?2, ?3, ?4)",
        )?;
        for attachment in attachments {
            insert.execute((
                &attachment.id,
                id.as_str(),
                &attachment.name,
                attachment.size,
            ))?;
        }
        Ok(())
    }

    pub async fn delete_attachments(&self, id: &MessageId) -> Result<(), StoreError> {
        trace!("deleting attachments of {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from attachments where message_id = ?1")?;
        stmt.execute([id.as_str()])?;
        Ok(())
    }

    pub async fn list_attachments(
        &self,
        id: &MessageId,
    ) -> Result<Vec<RemoteAttachment>, StoreError> {
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "select id, name, size from attachments where message_id = ?1 order by id",
        )?;
        let attachments = stmt
            .query_map([id.as_str()], |row| {
                Ok(RemoteAttachment {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    size: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    /// Mailbox location derived from a label set: an exclusive system label
    /// wins in feed order, then any folder-kind label, else all-mail.
    pub async fn derive_location(&self, labels: &[LabelId]) -> Result<Location, StoreError> {
        for id in labels {
            if let Some(location) = Location::from_system_label(id) {
                return Ok(location);
            }
        }
        for id in labels {
            if let Some(label) = self.find_label(id).await?
                && label.kind == LabelKind::Folder
            {
                return Ok(Location::Folder);
            }
        }
        Ok(Location::AllMail)
    }
}
