use log::{debug, error, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    feed::{ConversationDelta, DeltaAction, LabelDelta, MessageId},
    replica::{Replica, StoreError},
};

/// Entities for which the feed is only a change notification; the
/// authoritative state has to be fetched again by whoever consumes this
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refetch {
    User,
    Addresses,
    MailSettings,
    Contacts,
}

/// Work that must not block the transactional message path.
#[derive(Debug)]
pub enum SideTask {
    ApplyLabels(Vec<LabelDelta>),
    ApplyConversations(Vec<ConversationDelta>),
    DeleteAttachments(MessageId),
    DeleteContactGroups,
    Refetch(Refetch),
    Shutdown,
}

/// Single worker draining fire-and-forget tasks in submission order. The
/// apply pass never awaits it; durability of these writes is decoupled from
/// cursor advancement.
#[derive(Debug)]
pub struct SideLane {
    tx: mpsc::UnboundedSender<SideTask>,
    worker: Option<JoinHandle<()>>,
}

impl SideLane {
    pub fn spawn(replica: Replica, refetch_tx: mpsc::UnboundedSender<Refetch>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                if matches!(task, SideTask::Shutdown) {
                    break;
                }
                if let Err(err) = run_task(&replica, &refetch_tx, task).await {
                    error!("side task failed: {err}");
                }
            }
        });

        Self {
            tx,
            worker: Some(worker),
        }
    }

    pub fn send(&self, task: SideTask) {
        if self.tx.send(task).is_err() {
            warn!("side lane already shut down, dropping task");
        }
    }

    pub fn request_refetch(&self, refetch: Refetch) {
        self.send(SideTask::Refetch(refetch));
    }

    /// Drains every queued task, then stops the worker.
    pub async fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(SideTask::Shutdown);
            if worker.await.is_err() {
                error!("side lane worker panicked");
            }
        }
    }
}

async fn run_task(
    replica: &Replica,
    refetch_tx: &mpsc::UnboundedSender<Refetch>,
    task: SideTask,
) -> Result<(), StoreError> {
    match task {
        SideTask::ApplyLabels(deltas) => {
            for delta in deltas {
                match delta.action {
                    DeltaAction::Create | DeltaAction::Update => match &delta.label {
                        Some(label) => replica.save_label(label).await?,
                        None => warn!("label delta {} without payload, skipping", delta.id),
                    },
                    DeltaAction::Delete => replica.delete_label(&delta.id).await?,
                    DeltaAction::UpdateFlags | DeltaAction::Unknown(_) => {
                        debug!("ignoring label action {:?} for {}", delta.action, delta.id);
                    }
                }
            }
        }
        SideTask::ApplyConversations(deltas) => {
            for delta in deltas {
                match delta.action {
                    DeltaAction::Create | DeltaAction::Update | DeltaAction::UpdateFlags => {
                        match &delta.conversation {
                            Some(conversation) => replica.save_conversation(conversation).await?,
                            None => {
                                warn!("conversation delta {} without payload, skipping", delta.id);
                            }
                        }
                    }
                    DeltaAction::Delete => replica.delete_conversation(&delta.id).await?,
                    DeltaAction::Unknown(code) => {
                        debug!("ignoring unknown conversation action {code} for {}", delta.id);
                    }
                }
            }
        }
        SideTask::DeleteAttachments(id) => replica.delete_attachments(&id).await?,
        SideTask::DeleteContactGroups => replica.delete_contact_groups().await?,
        SideTask::Refetch(refetch) => {
            info!("requesting re-fetch of {refetch:?}");
            let _ = refetch_tx.send(refetch);
        }
        SideTask::Shutdown => {}
    }
    Ok(())
}
