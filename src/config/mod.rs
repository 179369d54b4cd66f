mod account;
mod auth;
mod mailfeed;

pub use account::AccountConfig;
pub use auth::AuthConfig;
pub use mailfeed::Config;
