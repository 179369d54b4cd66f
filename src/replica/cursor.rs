use log::trace;

use crate::{
    feed::EventId,
    replica::{
        Replica, StoreError,
        store::KEY_NEXT_EVENT_ID,
    },
};

/// Position in one account's change feed.
///
/// Stored as the `next_event_id` key: absent row = `Unset` (never
/// bootstrapped), empty string = `Locked` (mid-bootstrap marker), non-empty
/// token = `Valid`. Both non-valid states force a fresh bootstrap, so a
/// crash between cache reset and baseline fetch can never resume from a
/// cursor that predates the reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Unset,
    Locked,
    Valid(EventId),
}

impl Replica {
    pub async fn read_cursor(&self) -> Result<Cursor, StoreError> {
        let token = self.kv_get(KEY_NEXT_EVENT_ID).await?;
        trace!("read cursor {token:?}");
        Ok(match token {
            None => Cursor::Unset,
            Some(raw) => match EventId::try_from(raw) {
                Ok(id) => Cursor::Valid(id),
                Err(_) => Cursor::Locked,
            },
        })
    }

    pub async fn write_cursor(&self, id: &EventId) -> Result<(), StoreError> {
        trace!("advancing cursor to {id}");
        self.kv_set(KEY_NEXT_EVENT_ID, id.as_str()).await
    }

    pub async fn lock_cursor(&self) -> Result<(), StoreError> {
        trace!("locking cursor");
        self.kv_set(KEY_NEXT_EVENT_ID, "").await
    }

    pub async fn clear_cursor(&self) -> Result<(), StoreError> {
        trace!("clearing cursor");
        self.kv_delete(KEY_NEXT_EVENT_ID).await
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::replica::testing::{TestReplica, replica};

    #[rstest]
    #[tokio::test]
    async fn test_cursor_starts_unset(replica: TestReplica) {
        assert_eq!(assert_ok!(replica.replica.read_cursor().await), Cursor::Unset);
    }

    #[rstest]
    #[tokio::test]
    async fn test_locked_cursor_reads_back_locked(replica: TestReplica) {
        assert_ok!(replica.replica.lock_cursor().await);
        assert_eq!(
            assert_ok!(replica.replica.read_cursor().await),
            Cursor::Locked
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_valid_cursor_round_trips(replica: TestReplica) {
        let id = assert_ok!(EventId::try_from("t0"));
        assert_ok!(replica.replica.write_cursor(&id).await);
        assert_eq!(
            assert_ok!(replica.replica.read_cursor().await),
            Cursor::Valid(id)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_clear_returns_cursor_to_unset(replica: TestReplica) {
        let id = assert_ok!(EventId::try_from("t0"));
        assert_ok!(replica.replica.write_cursor(&id).await);
        assert_ok!(replica.replica.clear_cursor().await);
        assert_eq!(assert_ok!(replica.replica.read_cursor().await), Cursor::Unset);
    }
}
