mod apply;
mod guard;
mod poller;
mod session;
mod side;
mod staging;

pub use apply::ApplyEngine;
pub use guard::PendingWriteGuard;
pub use poller::Poller;
pub use poller::SyncError;
pub use session::AccountSession;
pub use session::SessionRegistry;
pub use side::Refetch;
pub use side::SideLane;
pub use side::SideTask;
pub use staging::StagedMessages;
pub use staging::StagingError;
pub use staging::stage;
