//! Recording packets in the hex-dump capture format.
//!
//! Output written here reads back through
//! [`CaptureReader`](super::CaptureReader) as the same packet sequence.

use std::io::Write;

use crate::error::Result;
use crate::packet::HexDump;

/// Writes packets as capture-format text.
pub struct CaptureWriter<W: Write> {
    inner: W,
    packets_written: usize,
}

impl<W: Write> CaptureWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            packets_written: 0,
        }
    }

    /// Write one packet, preceded by a timestamp line if one is given.
    ///
    /// The timestamp must start with `<digits>-<digits>-<digits>`; a
    /// separating space is appended. Without a timestamp the packet is
    /// still delimited by its zero offset. Empty packets produce no data
    /// lines and therefore cannot be read back.
    pub fn write_packet(&mut self, timestamp: Option<&str>, packet: &[u8]) -> Result<()> {
        if let Some(stamp) = timestamp {
            writeln!(self.inner, "{} ", stamp.trim_end())?;
        }
        write!(self.inner, "{}", HexDump(packet))?;
        self.packets_written += 1;
        Ok(())
    }

    /// Write a comment line.
    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        writeln!(self.inner, "# {}", text)?;
        Ok(())
    }

    /// Number of packets written so far.
    pub fn packets_written(&self) -> usize {
        self.packets_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
