//! Wire format encoding and decoding.
//!
//! Every frame is a 4-byte length header followed by the payload:
//! ```text
//! ┌──────────┬─────────────────┐
//! │ Length N │ Payload         │
//! │ 4 bytes  │ N bytes         │
//! │ uint32 BE│                 │
//! └──────────┴─────────────────┘
//! ```
//!
//! Frames are concatenated with no separator, magic or checksum.

use crate::error::{Result, WireError};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload length.
pub const DEFAULT_MTU: u32 = 16384;

/// Size of the persistent receive scratch buffer.
pub const SCRATCH_SIZE: usize = 4096;

/// Encode a payload length as a big-endian header.
///
/// # Example
///
/// ```
/// use packetwire::protocol::encode_header;
///
/// assert_eq!(encode_header(258), [0, 0, 1, 2]);
/// ```
#[inline]
pub fn encode_header(payload_length: u32) -> [u8; HEADER_SIZE] {
    payload_length.to_be_bytes()
}

/// Decode a payload length from the first four bytes of `buf`.
///
/// Returns `None` if buffer is too short.
#[inline]
pub fn decode_header(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Check a payload length against the MTU.
pub fn validate_length(payload_length: u64, mtu: u32) -> Result<()> {
    if payload_length > u64::from(mtu) {
        return Err(WireError::PayloadTooLarge {
            length: payload_length,
            mtu,
        });
    }
    Ok(())
}
