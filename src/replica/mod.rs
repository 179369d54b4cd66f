mod contact;
mod conversation;
mod counts;
mod cursor;
mod label;
mod message;
mod pending;
mod store;

pub use counts::CountKind;
pub use cursor::Cursor;
pub use message::LocalMessage;
pub use message::Location;
pub use pending::PendingSend;
pub use store::Replica;
pub use store::StoreError;

#[cfg(test)]
pub(crate) mod testing;
