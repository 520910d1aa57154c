use thiserror::Error;

use crate::navigation::NavError;

/// Errors reported by a [Session](crate::prelude::Session).
/// None of them is fatal: the session remains usable afterwards,
/// [Error::EndOfInput] excepted, which terminates file backed sessions.
#[derive(Debug, Error)]
pub enum Error {
    /// Decoded frame length is null or exceeds the protocol limit
    #[error("illegal frame length: {0}")]
    FrameLength(usize),
    /// Integrity check failure
    #[error("checksum error: expected {expected:#x}, computed {computed:#x}")]
    Checksum { expected: u32, computed: u32 },
    /// Field access beyond the end of the frame
    #[error("truncated field: {width} byte(s) at offset {offset}, length {len}")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("unresolved satellite: {0}")]
    UnknownSatellite(u32),
    #[error("invalid fragment id: {0}")]
    FragmentId(u8),
    /// Payload length does not match the declared number of records
    #[error("inconsistent length {len} for {count} record(s)")]
    RecordCount { len: usize, count: usize },
    #[error("too many satellites in epoch (max. {0})")]
    EpochFull(usize),
    #[error("epoch mismatch")]
    EpochMismatch,
    /// Receiver time is required but not known yet
    #[error("receiver time is not known")]
    NoTime,
    #[error("malformed message: {0}")]
    Malformed(&'static str),
    /// Rejection from the navigation message decoder
    #[error("navigation decoding: {0}")]
    Navigation(#[from] NavError),
    #[error("end of input")]
    EndOfInput,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
