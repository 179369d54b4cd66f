use log::{debug, info};
use thiserror::Error;

use crate::{
    feed::{EventId, EventSource, FeedError, MessageSource, Refresh, code},
    replica::{Cursor, StoreError},
    sync::{
        apply::ApplyEngine,
        session::AccountSession,
        side::{Refetch, SideTask},
        staging::{self, StagingError},
    },
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("event feed request failed: {0}")]
    Feed(#[from] FeedError),
    #[error("event feed returned code {0}")]
    UnexpectedCode(u32),
    #[error("staging aborted: {0}")]
    Staging(#[from] StagingError),
    #[error("replica store failed: {0}")]
    Store(#[from] StoreError),
}

/// Drives one account through bootstrap → fetch → stage → apply → advance,
/// looping while the feed reports more pages. Any failure before the cursor
/// write leaves the cursor untouched, so the next scheduled invocation
/// re-fetches the same batch.
pub struct Poller;

impl Poller {
    pub async fn poll<S: EventSource + MessageSource>(
        session: &mut AccountSession<S>,
    ) -> Result<(), SyncError> {
        loop {
            let position = match session.replica.read_cursor().await? {
                Cursor::Valid(id) => id,
                Cursor::Unset | Cursor::Locked => Self::bootstrap(session).await?,
            };

            debug!("checking events from {position}");
            let batch = session.source.check(&position).await?;
            if !code::is_success(batch.code) {
                return Err(SyncError::UnexpectedCode(batch.code));
            }

            let refresh = batch.refresh_flags();
            if refresh.contains(Refresh::Mail) {
                info!("feed requested a full refresh, discarding batch");
                Self::reset_all(session).await?;
                // the reset supersedes the batch; the next cycle starts
                // over from latest()
                return Ok(());
            }
            if refresh.contains(Refresh::Contacts) {
                info!("feed requested a contact refresh");
                Self::reset_contacts(session).await?;
            }

            let mut staged = staging::stage(
                &mut session.source,
                &session.replica,
                &batch.message_updates,
            )
            .await?;
            ApplyEngine::new(&session.replica, &session.side)
                .apply(&batch, &mut staged)
                .await?;
            debug_assert!(
                staged.is_empty(),
                "staged messages must not outlive their batch"
            );

            session.replica.write_cursor(&batch.event_id).await?;
            debug!("cursor advanced to {}", batch.event_id);

            if !batch.has_more {
                return Ok(());
            }
        }
    }

    /// First contact with the feed (or recovery from an interrupted
    /// bootstrap): lock the cursor, drop the local caches, queue the
    /// authoritative re-fetches, then persist a fresh baseline.
    async fn bootstrap<S: EventSource>(
        session: &mut AccountSession<S>,
    ) -> Result<EventId, SyncError> {
        let _gate = session.bootstrap_gate.lock().await;

        info!("bootstrapping change feed cursor");
        session.replica.lock_cursor().await?;
        session.replica.clear_messages().await?;
        session.replica.clear_contacts().await?;
        session.side.send(SideTask::DeleteContactGroups);
        session.side.request_refetch(Refetch::User);
        session.side.request_refetch(Refetch::Addresses);
        session.side.request_refetch(Refetch::MailSettings);
        session.side.request_refetch(Refetch::Contacts);

        let latest = session.source.latest().await?;
        if !code::is_success(latest.code) {
            return Err(SyncError::UnexpectedCode(latest.code));
        }
        session.replica.write_cursor(&latest.event_id).await?;
        info!("cursor bootstrapped at {}", latest.event_id);
        Ok(latest.event_id)
    }

    async fn reset_contacts<S>(session: &mut AccountSession<S>) -> Result<(), SyncError> {
        session.replica.clear_contacts().await?;
        session.side.send(SideTask::DeleteContactGroups);
        session.side.request_refetch(Refetch::Contacts);
        Ok(())
    }

    /// Mirrors the bootstrap's local actions and re-locks the cursor, so
    /// even a crash before the next cycle still forces a fresh baseline.
    async fn reset_all<S>(session: &mut AccountSession<S>) -> Result<(), SyncError> {
        session.replica.lock_cursor().await?;
        session.replica.clear_messages().await?;
        Self::reset_contacts(session).await?;
        session.side.request_refetch(Refetch::User);
        session.side.request_refetch(Refetch::Addresses);
        session.side.request_refetch(Refetch::MailSettings);
        Ok(())
    }
}
