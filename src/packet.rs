//! Packet type and hex-dump rendering.
//!
//! A packet is an immutable byte sequence. `bytes::Bytes` lets ownership move
//! from the parser or decoder to the driver without copying.

use std::fmt;

use bytes::Bytes;

/// One discrete packet.
pub type Packet = Bytes;

/// Number of bytes rendered per data line.
pub const BYTES_PER_LINE: usize = 16;

/// Display adaptor rendering bytes as capture-format data lines.
///
/// Each line is `<offset> <byte> <byte> ...` with a 4-digit hex offset,
/// which is exactly what [`CaptureReader`](crate::capture::CaptureReader)
/// accepts. An empty packet renders as nothing.
///
/// # Example
///
/// ```
/// use packetwire::packet::HexDump;
///
/// let text = HexDump(&[0xaa, 0xbb]).to_string();
/// assert_eq!(text, "0000 aa bb\n");
/// ```
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, chunk) in self.0.chunks(BYTES_PER_LINE).enumerate() {
            write!(f, "{:04x}", index * BYTES_PER_LINE)?;
            for byte in chunk {
                write!(f, " {:02x}", byte)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
