use log::trace;
use rusqlite::OptionalExtension;

use crate::{
    feed::{CountEntry, LabelId},
    replica::{Replica, StoreError},
};

/// Which entity a counter row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Message,
    Conversation,
}

impl CountKind {
    fn code(self) -> i64 {
        match self {
            Self::Message => 0,
            Self::Conversation => 1,
        }
    }
}

impl Replica {
    /// The feed always carries authoritative totals, so this is a plain
    /// bulk insert-or-update.
    pub async fn upsert_counts(
        &self,
        kind: CountKind,
        entries: &[CountEntry],
    ) -> Result<(), StoreError> {
        trace!("upserting {} {kind:?} counters", entries.len());
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into unread_counts (kind, label_id, total, unread)
            values (?1, ?2, ?3, ?4)",
        )?;
        for entry in entries {
            stmt.execute((kind.code(), entry.label_id.as_str(), entry.total, entry.unread))?;
        }
        Ok(())
    }

    pub async fn find_count(
        &self,
        kind: CountKind,
        label_id: &LabelId,
    ) -> Result<Option<CountEntry>, StoreError> {
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "select label_id, total, unread from unread_counts where kind = ?1 and label_id = ?2",
        )?;
        Ok(stmt
            .query_one((kind.code(), label_id.as_str()), |row| {
                Ok(CountEntry {
                    label_id: LabelId::from(row.get::<_, String>(0)?),
                    total: row.get(1)?,
                    unread: row.get(2)?,
                })
            })
            .optional()?)
    }
}
