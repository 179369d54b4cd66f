use derive_getters::Getters;
use serde::Deserialize;

use crate::config::auth::AuthConfig;

#[derive(Debug, Deserialize, Getters)]
pub struct AccountConfig {
    api_base_url: String,
    auth: AuthConfig,
}
