//! Error types for packetwire.
//!
//! Transient conditions (would-block, connect still in progress, no pending
//! connection) are never errors; they show up as `false` or empty results.
//! Everything in [`WireError`] is fatal for the instance that produced it.

use thiserror::Error;

/// Main error type for all packetwire operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// Unclassified I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A capture data line does not continue the packet being accumulated.
    #[error("{file}:{line}: Expected offset 0x{expected:x} but got 0x{actual:x}")]
    OffsetMismatch {
        file: String,
        line: usize,
        expected: u64,
        actual: u64,
    },

    /// A capture data line carries a token that is not a hex byte.
    #[error("{file}:{line}: Invalid hex byte {token:?}")]
    InvalidByte {
        file: String,
        line: usize,
        token: String,
    },

    /// A capture line matches no known shape (strict mode only).
    #[error("{file}:{line}: Unrecognized line {text:?}")]
    UnrecognizedLine {
        file: String,
        line: usize,
        text: String,
    },

    /// A frame declares (or a caller submits) a payload longer than the MTU.
    #[error("Packet length {length} exceeds MTU {mtu}")]
    PayloadTooLarge { length: u64, mtu: u32 },

    /// The caller broke the calling protocol of a non-blocking operation.
    #[error("Precondition failed: {0}")]
    Precondition(&'static str),

    /// Hostname or endpoint could not be resolved.
    #[error("Address error: {0}")]
    Address(String),

    /// Invalid transport or reader configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`WireError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The data stream cannot be reconstructed or breaks a safety bound.
    ProtocolViolation,
    /// A programming error in the driver.
    Precondition,
    /// Operating system failure.
    Io,
    /// Bad configuration, caught before any I/O.
    Config,
}

impl WireError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WireError::Io(_) => ErrorKind::Io,
            WireError::OffsetMismatch { .. }
            | WireError::InvalidByte { .. }
            | WireError::UnrecognizedLine { .. }
            | WireError::PayloadTooLarge { .. } => ErrorKind::ProtocolViolation,
            WireError::Precondition(_) => ErrorKind::Precondition,
            WireError::Address(_) | WireError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;
