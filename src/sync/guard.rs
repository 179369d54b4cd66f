use crate::{
    feed::{DeltaAction, MessageDelta},
    replica::{Replica, StoreError},
};

/// Protects locally originated, not-yet-confirmed writes from being
/// clobbered by stale remote events.
pub struct PendingWriteGuard<'a> {
    replica: &'a Replica,
}

impl<'a> PendingWriteGuard<'a> {
    pub fn new(replica: &'a Replica) -> Self {
        Self { replica }
    }

    /// True when the delta must be skipped: an update or flags patch for a
    /// message with an outstanding local send. A remote delete always wins
    /// over an in-flight send, and creates cannot race one.
    pub async fn blocks(&self, delta: &MessageDelta) -> Result<bool, StoreError> {
        if !matches!(
            delta.action,
            DeltaAction::Update | DeltaAction::UpdateFlags
        ) {
            return Ok(false);
        }
        if self
            .replica
            .find_pending_send_by_message_id(&delta.id)
            .await?
            .is_some()
        {
            return Ok(true);
        }
        // the remote id may still be the optimistic local one
        Ok(self
            .replica
            .find_pending_send_by_offline_id(delta.id.as_str())
            .await?
            .is_some())
    }
}
