//! Receive-side frame reassembly for non-blocking, vectored reads.
//!
//! Implements a state machine for handling fragmented frames:
//! - Awaiting more: fewer than 4 bytes of a header sit at the front of the
//!   scratch buffer
//! - In progress: header decoded, payload partially received into a buffer
//!   sized to the declared length
//!
//! Each [`FrameBuffer::read_from`] performs exactly one `read_vectored` into
//! the remaining region of the in-progress packet (if any) followed by the
//! scratch buffer, so payload bytes of a large packet land in their final
//! place without an extra copy.
//!
//! # Example
//!
//! ```
//! use packetwire::protocol::{build_frame, FrameBuffer, DEFAULT_MTU};
//!
//! let mut buffer = FrameBuffer::new(DEFAULT_MTU);
//! let mut wire = &build_frame(b"hello")[..];
//!
//! let received = buffer.read_from(&mut wire).unwrap();
//! assert_eq!(received.packets.len(), 1);
//! assert_eq!(&received.packets[0][..], b"hello");
//! ```

use std::io::{self, IoSliceMut, Read};

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_header, validate_length, HEADER_SIZE, SCRATCH_SIZE};
use crate::error::{Result, WireError};
use crate::packet::Packet;

/// Outcome of one receive step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Received {
    /// Packets completed by this step, in arrival order.
    pub packets: Vec<Packet>,
    /// The peer closed the stream. No further reads may be attempted.
    pub end_of_stream: bool,
}

impl Received {
    fn end() -> Self {
        Self {
            packets: Vec::new(),
            end_of_stream: true,
        }
    }
}

/// A packet whose header has been decoded but whose payload is incomplete.
#[derive(Debug)]
struct PartialPacket {
    /// Buffer sized to the declared length.
    buf: BytesMut,
    /// Payload bytes received so far. Always less than `buf.len()`.
    filled: usize,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Persistent scratch buffer. Empty once the stream has ended.
    scratch: Vec<u8>,
    /// Bytes of an incomplete header at the front of `scratch`.
    valid: usize,
    /// In-progress packet. When set, `valid` is zero.
    partial: Option<PartialPacket>,
    /// Maximum allowed payload length.
    mtu: u32,
    /// End of stream has been reported.
    closed: bool,
    /// A protocol violation was reported; the stream position is lost.
    failed: bool,
}

impl FrameBuffer {
    /// Create a frame buffer accepting payloads up to `mtu` bytes.
    pub fn new(mtu: u32) -> Self {
        Self {
            scratch: vec![0u8; SCRATCH_SIZE],
            valid: 0,
            partial: None,
            mtu,
            closed: false,
            failed: false,
        }
    }

    /// True once end of stream has been reported.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of bytes held for frames not yet complete.
    pub fn buffered(&self) -> usize {
        match &self.partial {
            Some(partial) => HEADER_SIZE + partial.filled,
            None => self.valid,
        }
    }

    /// Perform one read and extract all frames it completes.
    ///
    /// A read that would block returns an empty [`Received`]. A read of zero
    /// bytes is end of stream: internal buffers are released and any
    /// incomplete frame is discarded.
    ///
    /// # Errors
    ///
    /// - [`WireError::Precondition`] if called after end of stream or after
    ///   a protocol violation
    /// - [`WireError::PayloadTooLarge`] if a header declares more than the MTU.
    ///   The buffer is unusable from then on.
    /// - [`WireError::Io`] for any other read failure
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<Received> {
        if self.closed {
            return Err(WireError::Precondition("receive called after end of stream"));
        }
        if self.failed {
            return Err(WireError::Precondition("receive called after a protocol violation"));
        }

        // The earliest bytes go into the partial packet if there is one, the
        // rest into the scratch buffer.
        let result = match self.partial.as_mut() {
            Some(partial) => {
                let mut bufs = [
                    IoSliceMut::new(&mut partial.buf[partial.filled..]),
                    IoSliceMut::new(&mut self.scratch[..]),
                ];
                reader.read_vectored(&mut bufs)
            }
            None => {
                let mut bufs = [IoSliceMut::new(&mut self.scratch[self.valid..])];
                reader.read_vectored(&mut bufs)
            }
        };

        let n = match result {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return Ok(Received::default());
            }
            Err(e) => return Err(e.into()),
        };

        if n == 0 {
            self.close();
            return Ok(Received::end());
        }

        match self.decode(n) {
            Ok(packets) => Ok(Received {
                packets,
                end_of_stream: false,
            }),
            Err(err) => {
                self.failed = true;
                self.release();
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        let discarded = self.buffered();
        if discarded != 0 {
            tracing::warn!("End of stream discards {} bytes of an incomplete frame", discarded);
        }
        self.closed = true;
        self.release();
    }

    fn release(&mut self) {
        self.partial = None;
        self.valid = 0;
        self.scratch = Vec::new();
    }

    /// Account for `n` newly read bytes and extract completed frames.
    fn decode(&mut self, n: usize) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        let mut available = n;

        // Handle a partial packet if there is one.
        if let Some(mut partial) = self.partial.take() {
            let missing = partial.buf.len() - partial.filled;
            if available < missing {
                partial.filled += available;
                self.partial = Some(partial);
                return Ok(packets);
            }
            packets.push(partial.buf.freeze());
            available -= missing;
        }

        // Whatever is left starts at the front of the scratch buffer, after
        // any header bytes carried over from the previous call.
        let end = self.valid + available;
        let mut offset = 0;

        while end - offset >= HEADER_SIZE {
            let length = match decode_header(&self.scratch[offset..end]) {
                Some(length) => length,
                None => break,
            };
            if let Err(err) = validate_length(u64::from(length), self.mtu) {
                tracing::error!("{}", err);
                return Err(err);
            }

            let length = length as usize;
            let frame_len = HEADER_SIZE + length;
            let payload_start = offset + HEADER_SIZE;

            // Stop if the packet is incomplete.
            if end - offset < frame_len {
                let have = end - payload_start;
                let mut buf = BytesMut::zeroed(length);
                buf[..have].copy_from_slice(&self.scratch[payload_start..end]);
                self.partial = Some(PartialPacket { buf, filled: have });
                self.valid = 0;
                return Ok(packets);
            }

            packets.push(Bytes::copy_from_slice(
                &self.scratch[payload_start..offset + frame_len],
            ));
            offset += frame_len;
        }

        // Move the trailing header bytes to the start of the buffer.
        self.scratch.copy_within(offset..end, 0);
        self.valid = end - offset;
        Ok(packets)
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("buffered", &self.buffered())
            .field("in_progress", &self.partial.is_some())
            .field("mtu", &self.mtu)
            .field("closed", &self.closed)
            .field("failed", &self.failed)
            .finish()
    }
}
