use enumflags2::{BitFlags, bitflags};

/// Server-side message flag bitmask as carried in the `Flags` wire field.
#[bitflags]
#[repr(u64)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageFlag {
    Received = 1,
    Sent = 1 << 1,
    Internal = 1 << 2,
    E2e = 1 << 3,
    Auto = 1 << 4,
    Replied = 1 << 5,
    RepliedAll = 1 << 6,
    Forwarded = 1 << 7,
}

/// Encryption kind derived from the flag bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Clear,
    /// End-to-end encrypted between accounts of the same service.
    Internal,
    /// End-to-end encrypted towards an external recipient.
    External,
}

impl Encryption {
    pub fn from_flags(flags: BitFlags<MessageFlag>) -> Self {
        if flags.contains(MessageFlag::Internal | MessageFlag::E2e) {
            Self::Internal
        } else if flags.contains(MessageFlag::E2e) {
            Self::External
        } else {
            Self::Clear
        }
    }
}
