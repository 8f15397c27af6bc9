//! Frame construction.
//!
//! `build_frame_parts` keeps header and payload separate for vectored
//! writes; `build_frame` produces one contiguous buffer.

use bytes::Bytes;

use super::wire_format::{encode_header, HEADER_SIZE};
use crate::error::{Result, WireError};
use crate::packet::Packet;

/// Build frame parts for scatter/gather I/O.
///
/// Returns the encoded header and the payload, without copying it.
///
/// # Errors
///
/// Returns a precondition error if the payload length does not fit the
/// 32-bit length header.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use packetwire::protocol::{build_frame_parts, HEADER_SIZE};
///
/// let (header, payload) = build_frame_parts(Bytes::from_static(b"hello")).unwrap();
/// assert_eq!(header.len(), HEADER_SIZE);
/// assert_eq!(header, [0, 0, 0, 5]);
/// assert_eq!(&payload[..], b"hello");
/// ```
pub fn build_frame_parts(payload: Packet) -> Result<([u8; HEADER_SIZE], Bytes)> {
    let length = u32::try_from(payload.len())
        .map_err(|_| WireError::Precondition("packet longer than a frame can describe"))?;
    Ok((encode_header(length), payload))
}

/// Build a complete frame as a single byte vector.
///
/// # Panics
///
/// Panics if the payload is longer than `u32::MAX` bytes.
///
/// # Example
///
/// ```
/// use packetwire::protocol::build_frame;
///
/// let bytes = build_frame(b"hello");
/// assert_eq!(bytes.len(), 4 + 5); // header + payload
/// ```
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let length = u32::try_from(payload.len()).expect("payload fits a frame");
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&encode_header(length));
    buf.extend_from_slice(payload);
    buf
}
