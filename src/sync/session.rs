use std::{
    collections::{HashMap, hash_map::Entry},
    path::{Path, PathBuf},
};

use log::info;
use tokio::sync::{Mutex, mpsc};

use crate::{
    replica::{Replica, StoreError},
    sync::side::{Refetch, SideLane},
};

/// Long-lived per-account sync state: the feed connection, the local
/// replica, the side lane, and the bootstrap gate.
#[derive(Debug)]
pub struct AccountSession<S> {
    account: String,
    pub(crate) source: S,
    pub(crate) replica: Replica,
    pub(crate) side: SideLane,
    refetch_rx: mpsc::UnboundedReceiver<Refetch>,
    /// Defensive gate: bootstrap must not run reentrantly even if invoked
    /// from a path other than the main sync lane.
    pub(crate) bootstrap_gate: Mutex<()>,
}

impl<S> AccountSession<S> {
    pub fn open(account: &str, state_dir: &Path, source: S) -> Result<Self, StoreError> {
        let replica = Replica::open(state_dir, account)?;
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        let side = SideLane::spawn(replica.clone(), refetch_tx);
        Ok(Self {
            account: account.to_string(),
            source,
            replica,
            side,
            refetch_rx,
            bootstrap_gate: Mutex::new(()),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Re-fetch requests accumulated since the last drain. The fetches
    /// themselves are the embedder's job.
    pub fn drain_refetches(&mut self) -> Vec<Refetch> {
        let mut requests = Vec::new();
        while let Ok(refetch) = self.refetch_rx.try_recv() {
            requests.push(refetch);
        }
        requests
    }

    pub async fn shutdown(&mut self) {
        self.side.shutdown().await;
    }
}

/// Account-to-session registry: a session is created on first use, cached
/// for the registry lifetime, and destroyed on logout (which also clears
/// the account's cursor and caches).
pub struct SessionRegistry<S> {
    state_dir: PathBuf,
    sessions: HashMap<String, AccountSession<S>>,
}

impl<S> SessionRegistry<S> {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            sessions: HashMap::new(),
        }
    }

    pub fn session(
        &mut self,
        account: &str,
        connect: impl FnOnce() -> S,
    ) -> Result<&mut AccountSession<S>, StoreError> {
        match self.sessions.entry(account.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                info!("opening session for {account}");
                let session = AccountSession::open(account, &self.state_dir, connect())?;
                Ok(entry.insert(session))
            }
        }
    }

    pub async fn logout(&mut self, account: &str) -> Result<(), StoreError> {
        info!("logging out {account}");
        let replica = match self.sessions.remove(account) {
            Some(mut session) => {
                session.shutdown().await;
                session.replica
            }
            None => Replica::open(&self.state_dir, account)?,
        };
        replica.clear_cursor().await?;
        replica.clear_messages().await?;
        replica.clear_contacts().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.shutdown().await;
        }
    }
}
