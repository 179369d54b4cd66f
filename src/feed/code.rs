//! Application-level result codes used by the remote authority.

pub const SUCCESS: u32 = 1000;

/// Message fetch: the message no longer exists on the server.
pub const MESSAGE_NOT_FOUND: u32 = 2501;
/// Message fetch: the caller may not read this message.
pub const MESSAGE_RESTRICTED: u32 = 2028;

pub fn is_success(code: u32) -> bool {
    code == SUCCESS
}

/// Codes that drop a single message from staging instead of failing the batch.
pub fn drops_single_message(code: u32) -> bool {
    matches!(code, MESSAGE_NOT_FOUND | MESSAGE_RESTRICTED)
}
