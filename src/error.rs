//! Error type for the fast-box transport.
//!
//! Only conditions a caller cannot recover from by falling back to the
//! generic path end up here. A declined send, an exhausted pool or a stale
//! slot are ordinary status values (`SendPath`, `PromotionOutcome`,
//! `PollStatus`).

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FboxError {
    /// The configuration cannot describe a valid fast box.
    #[error("invalid fast-box configuration: {0}")]
    InvalidConfig(String),

    /// Tag 0 and the control tags 0xfe/0xff cannot be sent or registered.
    #[error("tag {0:#06x} is reserved")]
    InvalidTag(u16),

    #[error("unknown endpoint {0}")]
    UnknownEndpoint(usize),

    /// A decoded header claims a payload that runs past the buffer end.
    #[error("corrupt fast box: record at offset {offset} with size {size} exceeds buffer of {capacity} bytes")]
    Corrupt { offset: u32, size: u32, capacity: u32 },

    /// A relocatable address did not resolve inside any mapped segment.
    #[error("relocatable address {0:#018x} does not resolve to a mapped segment")]
    BadRelativeAddress(u64),

    /// The endpoint already has an inbound fast box installed.
    #[error("endpoint {0} already has an inbound fast box")]
    AlreadyMapped(usize),

    /// The generic path refused a message or a fragment.
    #[error("generic path failed with status {0}")]
    GenericPath(i32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FboxError>;
