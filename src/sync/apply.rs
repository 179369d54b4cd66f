use std::cmp::Reverse;

use enumflags2::BitFlags;
use log::{debug, trace, warn};

use crate::{
    feed::{
        ContactDelta, ContactEmailDelta, DeltaAction, EventBatch, MessageDelta, MessagePatch,
    },
    replica::{CountKind, LocalMessage, Replica, StoreError},
    sync::{
        guard::PendingWriteGuard,
        side::{Refetch, SideLane, SideTask},
        staging::StagedMessages,
    },
};

/// A merged expiration equal to this exact value marks the message as
/// already expired; it is deleted instead of saved.
const ALREADY_EXPIRED: i64 = 1;

/// Commits one staged batch to the replica.
///
/// Entity order is fixed: labels, messages, conversations, contacts,
/// contact emails, mail settings, user settings, user, addresses, used
/// space, counters. Message, contact, and counter writes are synchronous so
/// the cursor only advances past durable state; label and conversation work
/// rides the side lane.
pub struct ApplyEngine<'a> {
    replica: &'a Replica,
    side: &'a SideLane,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(replica: &'a Replica, side: &'a SideLane) -> Self {
        Self { replica, side }
    }

    pub async fn apply(
        &self,
        batch: &EventBatch,
        staged: &mut StagedMessages,
    ) -> Result<(), StoreError> {
        if !batch.label_updates.is_empty() {
            self.side
                .send(SideTask::ApplyLabels(batch.label_updates.clone()));
        }

        self.apply_messages(&batch.message_updates, staged).await?;

        if !batch.conversation_updates.is_empty() {
            self.side.send(SideTask::ApplyConversations(
                batch.conversation_updates.clone(),
            ));
        }

        self.apply_contacts(&batch.contact_updates).await?;
        self.apply_contact_emails(&batch.contact_emails_updates)
            .await?;

        if let Some(settings) = &batch.mail_settings_updates {
            self.replica.set_mail_settings(settings).await?;
            self.side.request_refetch(Refetch::MailSettings);
        }
        if batch.user_settings_updates.is_some() || batch.user_updates.is_some() {
            self.side.request_refetch(Refetch::User);
        }
        if batch.addresses.is_some() {
            self.side.request_refetch(Refetch::Addresses);
        }
        if let Some(used_space) = batch.used_space {
            self.replica.set_used_space(used_space).await?;
        }

        self.replica
            .upsert_counts(CountKind::Message, &batch.message_counts)
            .await?;
        self.replica
            .upsert_counts(CountKind::Conversation, &batch.conversation_counts)
            .await?;
        Ok(())
    }

    async fn apply_messages(
        &self,
        deltas: &[MessageDelta],
        staged: &mut StagedMessages,
    ) -> Result<(), StoreError> {
        let guard = PendingWriteGuard::new(self.replica);
        let mut ordered: Vec<&MessageDelta> = deltas.iter().collect();
        // feed encoding rule: higher action codes commit first, ties keep
        // feed order
        ordered.sort_by_key(|delta| Reverse(delta.action.code()));

        for delta in ordered {
            self.apply_message(&guard, delta, staged).await?;
        }
        Ok(())
    }

    async fn apply_message(
        &self,
        guard: &PendingWriteGuard<'_>,
        delta: &MessageDelta,
        staged: &mut StagedMessages,
    ) -> Result<(), StoreError> {
        if guard.blocks(delta).await? {
            debug!("skipping {}: local write in flight", delta.id);
            return Ok(());
        }
        match delta.action {
            DeltaAction::Delete => self.apply_delete(delta).await,
            DeltaAction::Create => self.apply_create(delta).await,
            DeltaAction::Update => self.apply_update(delta, staged).await,
            DeltaAction::UpdateFlags => self.apply_update_flags(delta, staged).await,
            DeltaAction::Unknown(code) => {
                warn!("ignoring unknown message action {code} for {}", delta.id);
                Ok(())
            }
        }
    }

    async fn apply_delete(&self, delta: &MessageDelta) -> Result<(), StoreError> {
        if self.replica.find_message(&delta.id).await?.is_some() {
            self.side
                .send(SideTask::DeleteAttachments(delta.id.clone()));
            self.replica.delete_message(&delta.id).await?;
        }
        Ok(())
    }

    async fn apply_create(&self, delta: &MessageDelta) -> Result<(), StoreError> {
        match self.replica.find_message(&delta.id).await? {
            None => match &delta.message {
                Some(full) => {
                    let location = self.replica.derive_location(full.label_ids()).await?;
                    self.replica
                        .save_message(&LocalMessage::from_remote(full, location))
                        .await?;
                    self.replica
                        .replace_attachments(&delta.id, full.attachments())
                        .await?;
                }
                None => warn!("create delta for {} without payload, skipping", delta.id),
            },
            Some(existing) => {
                // replayed create; merge whatever the delta patches
                trace!("create for existing message {}", delta.id);
                self.merge_and_store(existing, &delta.patch).await?;
            }
        }
        Ok(())
    }

    async fn apply_update(
        &self,
        delta: &MessageDelta,
        staged: &mut StagedMessages,
    ) -> Result<(), StoreError> {
        match (self.replica.find_message(&delta.id).await?, staged.take(&delta.id)) {
            (Some(mut local), Some(fresh)) => {
                if fresh.time() > local.time {
                    local.body = fresh.body().clone();
                    local.num_attachments = fresh.num_attachments();
                    self.replica
                        .replace_attachments(&delta.id, fresh.attachments())
                        .await?;
                }
                self.merge_and_store(local, &delta.patch).await?;
            }
            (None, Some(fresh)) => {
                let location = self.replica.derive_location(fresh.label_ids()).await?;
                self.replica
                    .save_message(&LocalMessage::from_remote(&fresh, location))
                    .await?;
                self.replica
                    .replace_attachments(&delta.id, fresh.attachments())
                    .await?;
            }
            (Some(_), None) => {
                trace!("no staged body for {}, leaving local record", delta.id);
            }
            (None, None) => trace!("update for unknown message {}, ignoring", delta.id),
        }
        Ok(())
    }

    async fn apply_update_flags(
        &self,
        delta: &MessageDelta,
        staged: &mut StagedMessages,
    ) -> Result<(), StoreError> {
        let skeleton = staged.take(&delta.id);
        match self.replica.find_message(&delta.id).await? {
            Some(local) => self.merge_and_store(local, &delta.patch).await,
            None => match skeleton {
                Some(fresh) => {
                    let location = self.replica.derive_location(fresh.label_ids()).await?;
                    self.merge_and_store(LocalMessage::from_remote(&fresh, location), &delta.patch)
                        .await
                }
                None => {
                    trace!("flags update for unknown message {}, ignoring", delta.id);
                    Ok(())
                }
            },
        }
    }

    /// Sparse merge, then persist, unless the merged record is already
    /// expired, in which case it is removed instead.
    async fn merge_and_store(
        &self,
        mut local: LocalMessage,
        patch: &MessagePatch,
    ) -> Result<(), StoreError> {
        self.merge(&mut local, patch).await?;
        if local.expiration_time == ALREADY_EXPIRED {
            debug!("message {} expired, deleting instead of saving", local.id);
            self.side
                .send(SideTask::DeleteAttachments(local.id.clone()));
            self.replica.delete_message(&local.id).await?;
        } else {
            self.replica.save_message(&local).await?;
        }
        Ok(())
    }

    async fn merge(
        &self,
        local: &mut LocalMessage,
        patch: &MessagePatch,
    ) -> Result<(), StoreError> {
        if let Some(subject) = &patch.subject {
            local.subject = subject.clone();
        }
        if let Some(unread) = patch.unread {
            local.unread = unread;
        }
        if let Some(sender) = &patch.sender {
            local.sender = sender.clone();
        }
        if let Some(to_list) = &patch.to_list {
            local.to_list = to_list.clone();
        }
        if let Some(cc_list) = &patch.cc_list {
            local.cc_list = cc_list.clone();
        }
        if let Some(bcc_list) = &patch.bcc_list {
            local.bcc_list = bcc_list.clone();
        }
        if let Some(time) = patch.time {
            local.time = time;
        }
        if patch.size > 0 {
            local.size = patch.size;
        }
        if patch.num_attachments > 0 {
            local.num_attachments = patch.num_attachments;
        }
        if patch.expiration_time >= 0 {
            local.expiration_time = patch.expiration_time;
        }
        if let Some(bits) = patch.flags {
            // replied / replied-all / forwarded / encryption are all views
            // of this mask and change together
            local.flags = BitFlags::from_bits_truncate(bits);
        }
        if let Some(address_id) = &patch.address_id {
            local.address_id = Some(address_id.clone());
        }
        if let Some(replacement) = &patch.label_ids {
            local.label_ids = replacement.clone();
        }

        let mut relabeled = false;
        if let Some(added) = &patch.label_ids_added {
            for id in added {
                if !local.label_ids.contains(id) {
                    local.label_ids.push(id.clone());
                }
            }
            relabeled = true;
        }
        if let Some(removed) = &patch.label_ids_removed {
            local.label_ids.retain(|id| !removed.contains(id));
            relabeled = true;
        }
        if relabeled {
            local.location = self.replica.derive_location(&local.label_ids).await?;
        }
        Ok(())
    }

    async fn apply_contacts(&self, deltas: &[ContactDelta]) -> Result<(), StoreError> {
        for delta in deltas {
            match delta.action {
                DeltaAction::Create | DeltaAction::Update => match &delta.contact {
                    Some(contact) => self.replica.save_contact(contact).await?,
                    None => warn!("contact delta {} without payload, skipping", delta.id),
                },
                DeltaAction::Delete => self.replica.delete_contact(&delta.id).await?,
                DeltaAction::UpdateFlags | DeltaAction::Unknown(_) => {
                    debug!("ignoring contact action {:?} for {}", delta.action, delta.id);
                }
            }
        }
        Ok(())
    }

    async fn apply_contact_emails(
        &self,
        deltas: &[ContactEmailDelta],
    ) -> Result<(), StoreError> {
        for delta in deltas {
            match delta.action {
                DeltaAction::Create | DeltaAction::Update => match &delta.contact_email {
                    Some(email) => self.replica.save_contact_email(email).await?,
                    None => warn!("contact email delta {} without payload, skipping", delta.id),
                },
                DeltaAction::Delete => self.replica.delete_contact_email(&delta.id).await?,
                DeltaAction::UpdateFlags | DeltaAction::Unknown(_) => {
                    debug!(
                        "ignoring contact email action {:?} for {}",
                        delta.action, delta.id
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;
    use tempfile::{TempDir, tempdir};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        feed::{
            Contact, Label, LabelId, LabelKind, MessageFetch, MessageFlag, MessageId,
            testing::{ScriptedSource, empty_batch, message_delta, remote_message},
        },
        replica::{Location, PendingSend},
        sync::staging,
    };

    struct Harness {
        _dir: TempDir,
        replica: Replica,
        lane: SideLane,
        refetch_rx: mpsc::UnboundedReceiver<Refetch>,
        source: ScriptedSource,
    }

    #[fixture]
    fn harness() -> Harness {
        let dir = assert_ok!(tempdir());
        let replica = assert_ok!(Replica::open(dir.path(), "alice"));
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        let lane = SideLane::spawn(replica.clone(), refetch_tx);
        Harness {
            _dir: dir,
            replica,
            lane,
            refetch_rx,
            source: ScriptedSource::default(),
        }
    }

    impl Harness {
        /// Full stage-then-apply cycle for one batch, like the poller runs it.
        async fn run(&mut self, batch: &EventBatch) {
            let mut staged = assert_ok!(
                staging::stage(&mut self.source, &self.replica, &batch.message_updates).await
            );
            let engine = ApplyEngine::new(&self.replica, &self.lane);
            assert_ok!(engine.apply(batch, &mut staged).await);
            assert!(staged.is_empty(), "staged map should be drained by apply");
        }

        async fn flush(&mut self) {
            self.lane.shutdown().await;
        }

        async fn message(&self, id: &str) -> Option<LocalMessage> {
            assert_ok!(self.replica.find_message(&MessageId::from(id)).await)
        }
    }

    fn create_delta(message: crate::feed::RemoteMessage) -> MessageDelta {
        let mut delta = message_delta(message.id().as_str(), DeltaAction::Create);
        delta.message = Some(message);
        delta
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_inserts_message(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch.message_updates.push(create_delta(remote_message("m1", 50)));

        harness.run(&batch).await;

        let local = assert_some!(harness.message("m1").await);
        assert_eq!(local.time, 50);
        assert_eq!(local.subject, "subject m1");
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_without_payload_is_skipped(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch
            .message_updates
            .push(message_delta("m1", DeltaAction::Create));

        harness.run(&batch).await;

        assert_none!(harness.message("m1").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_create_is_idempotent(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch.message_updates.push(create_delta(remote_message("m1", 50)));

        harness.run(&batch).await;
        harness.run(&batch).await;

        assert_some!(harness.message("m1").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_removes_message_and_attachments(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;

        let mut batch = empty_batch("t2");
        batch
            .message_updates
            .push(message_delta("m1", DeltaAction::Delete));
        harness.run(&batch).await;
        // replay of the same delete must stay a no-op
        harness.run(&batch).await;
        harness.flush().await;

        assert_none!(harness.message("m1").await);
        assert_is_empty!(assert_ok!(
            harness
                .replica
                .list_attachments(&MessageId::from("m1"))
                .await
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_replaces_body_only_when_strictly_newer(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;

        // stale fetch: body untouched, flags still merged
        harness.source.script_fetch(
            "m1",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m1", 40)))),
        );
        let mut stale = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::Update);
        delta.patch.unread = Some(true);
        stale.message_updates.push(delta);
        harness.run(&stale).await;

        let local = assert_some!(harness.message("m1").await);
        assert_eq!(local.body.as_deref(), Some("body m1 at 50"));
        assert!(local.unread);

        // newer fetch: body replaced
        harness.source.script_fetch(
            "m1",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m1", 60)))),
        );
        let mut newer = empty_batch("t3");
        newer
            .message_updates
            .push(message_delta("m1", DeltaAction::Update));
        harness.run(&newer).await;

        let local = assert_some!(harness.message("m1").await);
        assert_eq!(local.body.as_deref(), Some("body m1 at 60"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_for_unknown_message_inserts_staged(mut harness: Harness) {
        harness.source.script_fetch(
            "m1",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m1", 7)))),
        );
        let mut batch = empty_batch("t1");
        batch
            .message_updates
            .push(message_delta("m1", DeltaAction::Update));

        harness.run(&batch).await;

        assert_eq!(assert_some!(harness.message("m1").await).time, 7);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sparse_merge_leaves_absent_fields_untouched(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;
        let before = assert_some!(harness.message("m1").await);

        let mut batch = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.unread = Some(true);
        batch.message_updates.push(delta);
        harness.run(&batch).await;

        let after = assert_some!(harness.message("m1").await);
        assert!(after.unread);
        assert_eq!(after.subject, before.subject);
        assert_eq!(after.time, before.time);
        assert_eq!(after.size, before.size);
        assert_eq!(after.expiration_time, before.expiration_time);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sparse_merge_applies_present_fields(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;

        let mut batch = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.subject = Some("patched".to_string());
        delta.patch.size = 7;
        delta.patch.time = Some(51);
        batch.message_updates.push(delta);
        harness.run(&batch).await;

        let after = assert_some!(harness.message("m1").await);
        assert_eq!(after.subject, "patched");
        assert_eq!(after.size, 7);
        assert_eq!(after.time, 51);
    }

    #[rstest]
    #[tokio::test]
    async fn test_flag_bitmask_overwrites_derived_fields_together(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;

        let mut batch = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.flags =
            Some((MessageFlag::Replied | MessageFlag::Forwarded).bits());
        batch.message_updates.push(delta);
        harness.run(&batch).await;

        let local = assert_some!(harness.message("m1").await);
        assert!(local.is_replied());
        assert!(local.is_forwarded());
        assert!(!local.is_replied_all());
    }

    #[rstest]
    #[tokio::test]
    async fn test_label_add_remove_recomputes_location(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;

        let mut batch = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.label_ids_added = Some(vec![LabelId::from("3")]);
        batch.message_updates.push(delta);
        harness.run(&batch).await;

        let local = assert_some!(harness.message("m1").await);
        assert_eq!(local.location, Location::Trash);
        assert!(local.label_ids.contains(&LabelId::from("3")));

        let mut batch = empty_batch("t3");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.label_ids_removed = Some(vec![LabelId::from("3")]);
        batch.message_updates.push(delta);
        harness.run(&batch).await;

        let local = assert_some!(harness.message("m1").await);
        assert_eq!(local.location, Location::AllMail);
    }

    #[rstest]
    #[tokio::test]
    async fn test_expired_message_is_deleted_on_merge(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;

        let mut batch = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.expiration_time = ALREADY_EXPIRED;
        batch.message_updates.push(delta);
        harness.run(&batch).await;

        assert_none!(harness.message("m1").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_pending_send_blocks_patch_but_not_delete(mut harness: Harness) {
        let mut setup = empty_batch("t1");
        setup.message_updates.push(create_delta(remote_message("m1", 50)));
        harness.run(&setup).await;
        assert_ok!(
            harness
                .replica
                .insert_pending_send(&PendingSend {
                    message_id: MessageId::from("m1"),
                    offline_id: None,
                })
                .await
        );

        let mut patch_batch = empty_batch("t2");
        let mut delta = message_delta("m1", DeltaAction::UpdateFlags);
        delta.patch.unread = Some(true);
        patch_batch.message_updates.push(delta);
        harness.run(&patch_batch).await;
        assert!(!assert_some!(harness.message("m1").await).unread);

        let mut delete_batch = empty_batch("t3");
        delete_batch
            .message_updates
            .push(message_delta("m1", DeltaAction::Delete));
        harness.run(&delete_batch).await;
        assert_none!(harness.message("m1").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_deltas_apply_in_descending_action_order(mut harness: Harness) {
        // feed order delete-then-create; the engine commits the create
        // first, so the delete wins
        let mut batch = empty_batch("t1");
        batch
            .message_updates
            .push(message_delta("m1", DeltaAction::Delete));
        batch.message_updates.push(create_delta(remote_message("m1", 50)));

        harness.run(&batch).await;

        assert_none!(harness.message("m1").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_unknown_action_is_a_no_op(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch
            .message_updates
            .push(message_delta("m1", DeltaAction::Unknown(9)));

        harness.run(&batch).await;

        assert_none!(harness.message("m1").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_contacts_and_emails_apply_synchronously(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch.contact_updates.push(ContactDelta {
            id: "c1".into(),
            action: DeltaAction::Create,
            contact: Some(Contact {
                id: "c1".into(),
                name: "Alice".to_string(),
                data: "blob".to_string(),
            }),
        });
        batch.contact_emails_updates.push(ContactEmailDelta {
            id: "e1".to_string(),
            action: DeltaAction::Create,
            contact_email: Some(crate::feed::ContactEmail {
                id: "e1".to_string(),
                contact_id: "c1".into(),
                email: "a@example.com".to_string(),
            }),
        });

        harness.run(&batch).await;

        assert_some!(assert_ok!(harness.replica.find_contact(&"c1".into()).await));
        assert_some!(assert_ok!(harness.replica.find_contact_email("e1").await));
    }

    #[rstest]
    #[tokio::test]
    async fn test_labels_and_conversations_ride_the_side_lane(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch.label_updates.push(crate::feed::LabelDelta {
            id: LabelId::from("l1"),
            action: DeltaAction::Create,
            label: Some(Label {
                id: LabelId::from("l1"),
                name: "work".to_string(),
                color: String::new(),
                kind: LabelKind::Label,
                order: 0,
            }),
        });
        batch.conversation_updates.push(crate::feed::ConversationDelta {
            id: "conv1".to_string(),
            action: DeltaAction::Create,
            conversation: Some(crate::feed::Conversation {
                id: "conv1".to_string(),
                subject: "thread".to_string(),
                num_unread: 1,
            }),
        });

        harness.run(&batch).await;
        harness.flush().await;

        assert_some!(assert_ok!(
            harness.replica.find_label(&LabelId::from("l1")).await
        ));
        assert_some!(assert_ok!(harness.replica.find_conversation("conv1").await));
    }

    #[rstest]
    #[tokio::test]
    async fn test_counters_and_used_space_apply(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch.message_counts.push(crate::feed::CountEntry {
            label_id: LabelId::from("0"),
            total: 5,
            unread: 2,
        });
        batch.used_space = Some(1234);

        harness.run(&batch).await;

        let count = assert_ok!(
            harness
                .replica
                .find_count(CountKind::Message, &LabelId::from("0"))
                .await
        );
        assert_eq!(assert_some!(count).unread, 2);
        assert_eq!(assert_ok!(harness.replica.used_space().await), Some(1234));
    }

    #[rstest]
    #[tokio::test]
    async fn test_settings_notifications_trigger_refetches(mut harness: Harness) {
        let mut batch = empty_batch("t1");
        batch.mail_settings_updates = Some(serde_json::json!({"Signature": "-- a"}));
        batch.user_settings_updates = Some(serde_json::json!({}));
        batch.addresses = Some(vec![]);

        harness.run(&batch).await;
        harness.flush().await;

        assert_some!(assert_ok!(harness.replica.mail_settings().await));
        let mut refetches = Vec::new();
        while let Ok(refetch) = harness.refetch_rx.try_recv() {
            refetches.push(refetch);
        }
        assert!(refetches.contains(&Refetch::MailSettings));
        assert!(refetches.contains(&Refetch::User));
        assert!(refetches.contains(&Refetch::Addresses));
    }

    #[rstest]
    #[tokio::test]
    async fn test_replaying_a_batch_is_idempotent(mut harness: Harness) {
        harness.source.script_fetch(
            "m2",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m2", 9)))),
        );
        harness.source.script_fetch(
            "m2",
            Ok(MessageFetch::Fetched(Box::new(remote_message("m2", 9)))),
        );

        let mut batch = empty_batch("t1");
        batch.message_updates.push(create_delta(remote_message("m1", 50)));
        batch
            .message_updates
            .push(message_delta("m2", DeltaAction::Update));
        batch
            .message_updates
            .push(message_delta("m3", DeltaAction::Delete));

        harness.run(&batch).await;
        let first_m1 = harness.message("m1").await;
        let first_m2 = harness.message("m2").await;

        harness.run(&batch).await;

        assert_eq!(harness.message("m1").await, first_m1);
        assert_eq!(harness.message("m2").await, first_m2);
        assert_none!(harness.message("m3").await);
    }
}
