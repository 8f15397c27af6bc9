//! Outbound frame cursor for non-blocking, vectored writes.
//!
//! A submitted packet becomes two queued buffers (header, payload). Each
//! call to [`SendCursor::write_to`] performs exactly one `write_vectored`
//! and records how far it got, so a frame can be pushed out over any number
//! of partial writes.
//!
//! ```text
//! queue: [ header (4) | payload (N) ]
//!            ^ offset into the front buffer
//! ```

use std::collections::VecDeque;
use std::io::{self, IoSlice, Write};

use bytes::Bytes;

use super::frame::build_frame_parts;
use super::wire_format::validate_length;
use crate::error::{Result, WireError};
use crate::packet::Packet;

/// Queue of buffers still to be written plus an offset into the front one.
///
/// Only one packet may be in flight: the queue is non-empty exactly while a
/// transmission is in progress.
#[derive(Debug)]
pub struct SendCursor {
    queue: VecDeque<Bytes>,
    offset: usize,
    mtu: u32,
}

impl SendCursor {
    /// Create an idle cursor accepting payloads up to `mtu` bytes.
    pub fn new(mtu: u32) -> Self {
        Self {
            queue: VecDeque::with_capacity(2),
            offset: 0,
            mtu,
        }
    }

    /// True when no transmission is in progress.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Bytes of the current frame not yet written.
    pub fn pending_bytes(&self) -> usize {
        self.queue.iter().map(Bytes::len).sum::<usize>() - self.offset
    }

    /// Queue a new packet for transmission.
    ///
    /// # Errors
    ///
    /// - [`WireError::Precondition`] if a transmission is already in progress
    /// - [`WireError::PayloadTooLarge`] if the packet exceeds the MTU
    pub fn submit(&mut self, packet: Packet) -> Result<()> {
        if !self.is_idle() {
            return Err(WireError::Precondition(
                "new packet submitted while a transmission is in progress",
            ));
        }
        validate_length(packet.len() as u64, self.mtu)?;

        let (header, payload) = build_frame_parts(packet)?;
        self.queue.push_back(Bytes::copy_from_slice(&header));
        self.queue.push_back(payload);
        self.offset = 0;
        Ok(())
    }

    /// Perform one vectored write of everything still queued.
    ///
    /// Returns `Ok(true)` once the whole frame has been written and the
    /// cursor is idle again, `Ok(false)` if bytes remain. A write that would
    /// block counts as zero bytes written.
    ///
    /// # Errors
    ///
    /// - [`WireError::Precondition`] if nothing is in flight
    /// - [`WireError::Io`] for any other write failure
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> Result<bool> {
        if self.is_idle() {
            return Err(WireError::Precondition(
                "send continued with no transmission in progress",
            ));
        }

        let written = {
            let slices: Vec<IoSlice<'_>> = self
                .queue
                .iter()
                .enumerate()
                .map(|(index, buf)| {
                    if index == 0 {
                        IoSlice::new(&buf[self.offset..])
                    } else {
                        IoSlice::new(buf)
                    }
                })
                .collect();

            match writer.write_vectored(&slices) {
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    0
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Include the bytes written by earlier calls.
        let mut remaining = written + self.offset;

        // Remove fully written buffers.
        while let Some(front) = self.queue.front() {
            if remaining < front.len() {
                break;
            }
            remaining -= front.len();
            self.queue.pop_front();
        }

        if self.queue.is_empty() {
            self.offset = 0;
            return Ok(true);
        }

        self.offset = remaining;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, DEFAULT_MTU};

    /// Writer accepting at most `limit` bytes per call.
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
        block_next: bool,
    }

    impl Trickle {
        fn new(limit: usize) -> Self {
            Self {
                out: Vec::new(),
                limit,
                block_next: false,
            }
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let mut budget = self.limit;
            let mut total = 0;
            for buf in bufs {
                let n = buf.len().min(budget);
                self.out.extend_from_slice(&buf[..n]);
                budget -= n;
                total += n;
                if budget == 0 {
                    break;
                }
            }
            Ok(total)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_single_write_completes() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(usize::MAX);

        cursor.submit(Bytes::from_static(b"hello")).unwrap();
        assert!(cursor.write_to(&mut writer).unwrap());
        assert!(cursor.is_idle());
        assert_eq!(writer.out, build_frame(b"hello"));
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(1);

        cursor.submit(Bytes::from_static(b"hi")).unwrap();
        let mut calls = 1;
        while !cursor.write_to(&mut writer).unwrap() {
            calls += 1;
        }

        assert_eq!(calls, 6);
        assert_eq!(writer.out, build_frame(b"hi"));
    }

    #[test]
    fn test_partial_write_spanning_header_and_payload() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(6);

        cursor.submit(Bytes::from_static(b"abcdef")).unwrap();
        assert!(!cursor.write_to(&mut writer).unwrap());
        assert_eq!(cursor.pending_bytes(), 4);
        assert!(cursor.write_to(&mut writer).unwrap());
        assert_eq!(writer.out, build_frame(b"abcdef"));
    }

    #[test]
    fn test_would_block_is_not_an_error() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(usize::MAX);
        writer.block_next = true;

        cursor.submit(Bytes::from_static(b"x")).unwrap();
        assert!(!cursor.write_to(&mut writer).unwrap());
        assert_eq!(cursor.pending_bytes(), 5);
        assert!(cursor.write_to(&mut writer).unwrap());
    }

    #[test]
    fn test_empty_packet() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(usize::MAX);

        cursor.submit(Bytes::new()).unwrap();
        assert!(cursor.write_to(&mut writer).unwrap());
        assert_eq!(writer.out, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_submit_while_in_flight_fails() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(2);

        cursor.submit(Bytes::from_static(b"first")).unwrap();
        assert!(!cursor.write_to(&mut writer).unwrap());

        let result = cursor.submit(Bytes::from_static(b"second"));
        assert!(matches!(result, Err(WireError::Precondition(_))));
    }

    #[test]
    fn test_continue_when_idle_fails() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(usize::MAX);

        let result = cursor.write_to(&mut writer);
        assert!(matches!(result, Err(WireError::Precondition(_))));
    }

    #[test]
    fn test_submit_over_mtu_fails() {
        let mut cursor = SendCursor::new(8);
        let result = cursor.submit(Bytes::from(vec![0u8; 9]));

        assert!(matches!(result, Err(WireError::PayloadTooLarge { .. })));
        assert!(cursor.is_idle());
    }

    #[test]
    fn test_consecutive_packets() {
        let mut cursor = SendCursor::new(DEFAULT_MTU);
        let mut writer = Trickle::new(3);

        let mut expected = Vec::new();
        for payload in [&b"one"[..], b"", b"three"] {
            expected.extend(build_frame(payload));
            cursor.submit(Bytes::copy_from_slice(payload)).unwrap();
            while !cursor.write_to(&mut writer).unwrap() {}
        }

        assert_eq!(writer.out, expected);
    }
}
