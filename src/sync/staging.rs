use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    feed::{DeltaAction, FeedError, MessageDelta, MessageFetch, MessageId, MessageSource,
        RemoteMessage},
    replica::{Replica, StoreError},
    sync::guard::PendingWriteGuard,
};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("message fetch failed: {0}")]
    Fetch(#[from] FeedError),
    #[error("pending-send lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Batch-scoped arena of pre-materialized messages, keyed by message id.
/// Owned by a single cycle: built here, drained during apply, dropped with
/// the batch, so nothing can leak into the next one.
#[derive(Debug, Default)]
pub struct StagedMessages {
    messages: HashMap<MessageId, RemoteMessage>,
}

impl StagedMessages {
    fn insert(&mut self, message: RemoteMessage) {
        self.messages.insert(message.id().clone(), message);
    }

    pub fn take(&mut self, id: &MessageId) -> Option<RemoteMessage> {
        self.messages.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Resolves the batch's message deltas into full records before anything is
/// written. A hard fetch failure aborts the whole batch: nothing has been
/// committed yet, and the unchanged cursor re-delivers the same batch next
/// cycle.
pub async fn stage<S: MessageSource>(
    source: &mut S,
    replica: &Replica,
    deltas: &[MessageDelta],
) -> Result<StagedMessages, StagingError> {
    let guard = PendingWriteGuard::new(replica);
    let mut staged = StagedMessages::default();

    for delta in deltas {
        if guard.blocks(delta).await? {
            debug!("not staging {}: local write in flight", delta.id);
            continue;
        }
        match delta.action {
            DeltaAction::UpdateFlags => staged.insert(delta.patch.to_skeleton(&delta.id)),
            DeltaAction::Update => match source.fetch_message(&delta.id).await? {
                MessageFetch::Fetched(message) => staged.insert(*message),
                MessageFetch::Unavailable(code) => {
                    warn!("message {} unavailable (code {code}), dropped from batch", delta.id);
                }
            },
            DeltaAction::Create | DeltaAction::Delete | DeltaAction::Unknown(_) => {}
        }
    }

    debug!("staged {} messages", staged.len());
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::{
        feed::testing::{ScriptedSource, message_delta, remote_message},
        replica::{PendingSend, testing::{TestReplica, replica}},
    };

    #[rstest]
    #[tokio::test]
    async fn test_update_deltas_fetch_full_messages(replica: TestReplica) {
        let mut source = ScriptedSource::default();
        source.script_fetch(
            "m1",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m1", 5)))),
        );

        let deltas = [message_delta("m1", DeltaAction::Update)];
        let mut staged =
            assert_ok!(stage(&mut source, &replica.replica, &deltas).await);

        assert_eq!(staged.len(), 1);
        let fetched = assert_some!(staged.take(&"m1".into()));
        assert_eq!(fetched.time(), 5);
        assert_eq!(source.fetched.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_flags_deltas_stage_without_network(replica: TestReplica) {
        let mut source = ScriptedSource::default();
        let deltas = [message_delta("m1", DeltaAction::UpdateFlags)];

        let staged = assert_ok!(stage(&mut source, &replica.replica, &deltas).await);

        assert_eq!(staged.len(), 1);
        assert_is_empty!(source.fetched);
    }

    #[rstest]
    #[tokio::test]
    async fn test_hard_fetch_failure_aborts_whole_batch(replica: TestReplica) {
        let mut source = ScriptedSource::default();
        source.script_fetch(
            "a",
            Ok(MessageFetch::Fetched(Box::new(remote_message("a", 1)))),
        );
        source.script_fetch("b", Err(ScriptedSource::transport_error()));

        let deltas = [
            message_delta("a", DeltaAction::Update),
            message_delta("b", DeltaAction::Update),
        ];
        assert_err!(stage(&mut source, &replica.replica, &deltas).await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_unavailable_message_is_dropped_not_fatal(replica: TestReplica) {
        let mut source = ScriptedSource::default();
        source.script_fetch("gone", Ok(MessageFetch::Unavailable(2501)));
        source.script_fetch(
            "kept",
            Ok(MessageFetch::Fetched(Box::new(remote_message("kept", 1)))),
        );

        let deltas = [
            message_delta("gone", DeltaAction::Update),
            message_delta("kept", DeltaAction::Update),
        ];
        let mut staged =
            assert_ok!(stage(&mut source, &replica.replica, &deltas).await);

        assert_none!(staged.take(&"gone".into()));
        assert_some!(staged.take(&"kept".into()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_pending_send_skips_staging_of_updates(replica: TestReplica) {
        assert_ok!(
            replica
                .replica
                .insert_pending_send(&PendingSend {
                    message_id: "m1".into(),
                    offline_id: None,
                })
                .await
        );
        let mut source = ScriptedSource::default();

        let deltas = [message_delta("m1", DeltaAction::Update)];
        let staged = assert_ok!(stage(&mut source, &replica.replica, &deltas).await);

        assert!(staged.is_empty());
        assert_is_empty!(source.fetched);
    }

    #[rstest]
    #[tokio::test]
    async fn test_later_fetch_overwrites_same_id(replica: TestReplica) {
        let mut source = ScriptedSource::default();
        source.script_fetch(
            "m1",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m1", 1)))),
        );
        source.script_fetch(
            "m1",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m1", 2)))),
        );

        let deltas = [
            message_delta("m1", DeltaAction::Update),
            message_delta("m1", DeltaAction::Update),
        ];
        let mut staged =
            assert_ok!(stage(&mut source, &replica.replica, &deltas).await);

        assert_eq!(assert_some!(staged.take(&"m1".into())).time(), 2);
    }
}
