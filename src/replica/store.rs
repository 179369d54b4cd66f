use std::{
    fs::create_dir_all,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::debug;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("state directory not usable: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported replica schema version {0}")]
    SchemaVersion(u32),
    #[error("stored row not decodable: {0}")]
    Decode(#[from] serde_json::Error),
}

const CURRENT_VERSION: u32 = 1;

pub(super) const KEY_NEXT_EVENT_ID: &str = "next_event_id";
pub(super) const KEY_USED_SPACE: &str = "used_space";
pub(super) const KEY_MAIL_SETTINGS: &str = "mail_settings";

/// Per-account local replica, one SQLite file under the account's state
/// directory. Cloning shares the connection; all access goes through the
/// async mutex so the sync lane and the side lane never interleave a write.
#[derive(Clone, Debug)]
pub struct Replica {
    db: Arc<Mutex<Connection>>,
}

impl Replica {
    pub fn open(state_dir: &Path, account: &str) -> Result<Self, StoreError> {
        let db_file = Self::prepare_db_file(state_dir, account)?;
        debug!("opening replica {}", db_file.to_string_lossy());
        let db = Connection::open_with_flags(
            db_file,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        match schema_version(&db)? {
            0 => init_schema(&db)?,
            CURRENT_VERSION => {}
            other => return Err(StoreError::SchemaVersion(other)),
        }

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn prepare_db_file(state_dir: &Path, account: &str) -> io::Result<PathBuf> {
        let mut dir = state_dir.join(account);
        create_dir_all(&dir)?;
        dir.push("replica.db");
        Ok(dir)
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().await
    }

    pub(super) async fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let db = self.lock().await;
        let mut stmt =
            db.prepare_cached("insert or replace into sync_state (key, value) values (?1, ?2)")?;
        stmt.execute((key, value))?;
        Ok(())
    }

    pub(super) async fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("select value from sync_state where key = ?1")?;
        Ok(stmt.query_one([key], |row| row.get(0)).optional()?)
    }

    pub(super) async fn kv_delete(&self, key: &str) -> Result<(), StoreError> {
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from sync_state where key = ?1")?;
        stmt.execute([key])?;
        Ok(())
    }

    pub async fn set_used_space(&self, bytes: i64) -> Result<(), StoreError> {
        self.kv_set(KEY_USED_SPACE, &bytes.to_string()).await
    }

    pub async fn used_space(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .kv_get(KEY_USED_SPACE)
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    /// Mail settings are persisted as the raw feed payload; the merge with
    /// server truth happens through the re-fetch hook, not here.
    pub async fn set_mail_settings(&self, value: &serde_json::Value) -> Result<(), StoreError> {
        self.kv_set(KEY_MAIL_SETTINGS, &value.to_string()).await
    }

    pub async fn mail_settings(&self) -> Result<Option<serde_json::Value>, StoreError> {
        self.kv_get(KEY_MAIL_SETTINGS)
            .await?
            .map(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
            .transpose()
    }
}

fn schema_version(db: &Connection) -> Result<u32, StoreError> {
    Ok(db.query_one("select * from pragma_user_version", [], |row| row.get(0))?)
}

fn init_schema(db: &Connection) -> Result<(), StoreError> {
    debug!("creating replica schema");
    db.execute_batch(
        "pragma journal_mode=wal;
        pragma user_version=1;
        pragma synchronous=1;
        create table messages (
            id text primary key,
            subject text not null,
            unread integer not null,
            sender text not null,
            to_list text not null,
            cc_list text not null,
            bcc_list text not null,
            time integer not null,
            size integer not null,
            num_attachments integer not null,
            expiration_time integer not null,
            flags integer not null,
            address_id text,
            label_ids text not null,
            location integer not null,
            body text
        ) strict;
        create table attachments (
            id text not null,
            message_id text not null,
            name text not null,
            size integer not null,
            primary key (message_id, id)
        ) strict;
        create table contacts (
            id text primary key,
            name text not null,
            data text not null
        ) strict;
        create table contact_emails (
            id text primary key,
            contact_id text not null,
            email text not null
        ) strict;
        create table labels (
            id text primary key,
            name text not null,
            color text not null,
            kind integer not null,
            sort_order integer not null
        ) strict;
        create table conversations (
            id text primary key,
            subject text not null,
            num_unread integer not null
        ) strict;
        create table unread_counts (
            kind integer not null,
            label_id text not null,
            total integer not null,
            unread integer not null,
            primary key (kind, label_id)
        ) strict;
        create table pending_sends (
            message_id text primary key,
            offline_id text
        ) strict;
        create table sync_state (
            key text primary key,
            value text not null
        ) strict;
        pragma optimize;",
    )?;
    Ok(())
}

impl Drop for Replica {
    fn drop(&mut self) {
        if let Some(db) = self.db.try_lock().ok().filter(|_| Arc::strong_count(&self.db) == 1) {
            let _ = db.execute("pragma optimize;", []);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::replica::testing::{TestReplica, replica};

    #[rstest]
    fn test_open_creates_db_file(replica: TestReplica) {
        assert!(assert_ok!(fs::exists(
            replica.dir.path().join("alice/replica.db")
        )));
    }

    #[rstest]
    fn test_open_uses_write_ahead_log(replica: TestReplica) {
        assert!(assert_ok!(fs::exists(
            replica.dir.path().join("alice/replica.db-wal")
        )));
    }

    #[rstest]
    #[tokio::test]
    async fn test_reopen_keeps_state(replica: TestReplica) {
        assert_ok!(replica.replica.set_used_space(99).await);
        drop(replica.replica);

        let reopened = assert_ok!(Replica::open(replica.dir.path(), "alice"));
        assert_eq!(assert_ok!(reopened.used_space().await), Some(99));
    }

    #[rstest]
    #[tokio::test]
    async fn test_mail_settings_round_trip(replica: TestReplica) {
        let value = serde_json::json!({"DisplayName": "Alice", "Signature": "-- a"});
        assert_ok!(replica.replica.set_mail_settings(&value).await);
        assert_eq!(
            assert_ok!(replica.replica.mail_settings().await),
            Some(value)
        );
    }
}
