use log::trace;
use rusqlite::OptionalExtension;

use crate::{
    feed::MessageId,
    replica::{Replica, StoreError},
};

/// One in-flight send or draft recorded by the local-write subsystem. The
/// sync engine only ever reads these; creation and cleanup belong to the
/// send path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub message_id: MessageId,
    pub offline_id: Option<String>,
}

impl Replica {
    pub async fn insert_pending_send(&self, pending: &PendingSend) -> Result<(), StoreError> {
        trace!("recording pending send {}", pending.message_id);
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into pending_sends (message_id, offline_id) values (?1, ?2)",
        )?;
        stmt.execute((pending.message_id.as_str(), pending.offline_id.as_deref()))?;
        Ok(())
    }

    pub async fn delete_pending_send(&self, message_id: &MessageId) -> Result<(), StoreError> {
        trace!("dropping pending send {message_id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from pending_sends where message_id = ?1")?;
        stmt.execute([message_id.as_str()])?;
        Ok(())
    }

    pub async fn find_pending_send_by_message_id(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<PendingSend>, StoreError> {
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "select message_id, offline_id from pending_sends where message_id = ?1",
        )?;
        Ok(stmt
            .query_one([message_id.as_str()], map_pending)
            .optional()?)
    }

    pub async fn find_pending_send_by_offline_id(
        &self,
        offline_id: &str,
    ) -> Result<Option<PendingSend>, StoreError> {
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "select message_id, offline_id from pending_sends where offline_id = ?1",
        )?;
        Ok(stmt.query_one([offline_id], map_pending).optional()?)
    }
}

fn map_pending(row: &rusqlite::Row) -> Result<PendingSend, rusqlite::Error> {
    Ok(PendingSend {
        message_id: MessageId::from(row.get::<_, String>(0)?),
        offline_id: row.get(1)?,
    })
}
