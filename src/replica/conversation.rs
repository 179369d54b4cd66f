use log::trace;
use rusqlite::OptionalExtension;

use crate::{
    feed::Conversation,
    replica::{Replica, StoreError},
};

impl Replica {
    pub async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        trace!("saving conversation {}", conversation.id);
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into conversations (id, subject, num_unread) values (?1, ?2, ?3)",
        )?;
        stmt.execute((
            &conversation.id,
            &conversation.subject,
            conversation.num_unread,
        ))?;
        Ok(())
    }

    pub async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let db = self.lock().await;
        let mut stmt =
            db.prepare_cached("select id, subject, num_unread from conversations where id = ?1")?;
        Ok(stmt
            .query_one([id], |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    subject: row.get(1)?,
                    num_unread: row.get(2)?,
                })
            })
            .optional()?)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), StoreError> {
        trace!("deleting conversation {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from conversations where id = ?1")?;
        stmt.execute([id])?;
        Ok(())
    }
}
