//! Packet reconstruction from hex-dump capture files.
//!
//! Packets are accumulated from data lines whose offsets must continue the
//! packet exactly. A timestamp line, an offset of zero, or the end of a file
//! completes the packet being accumulated.
//!
//! # Example
//!
//! ```no_run
//! use packetwire::capture::CaptureReader;
//!
//! let reader = CaptureReader::new(["in.hex"]).verbosity(1);
//! for packet in reader.iterate() {
//!     let packet = packet?;
//!     println!("{} bytes", packet.len());
//! }
//! # Ok::<(), packetwire::WireError>(())
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::line::{classify, parse_byte, Line};
use crate::error::{Result, WireError};
use crate::packet::{HexDump, Packet};

/// What to do with a line that matches no known shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Skip it silently.
    #[default]
    Lenient,
    /// Fail with [`WireError::UnrecognizedLine`]. Data lines with trailing
    /// whitespace count as unrecognized too.
    Strict,
}

/// Reads packets from an ordered list of capture files.
#[derive(Debug, Clone)]
pub struct CaptureReader {
    files: Vec<PathBuf>,
    verbosity: u8,
    strictness: Strictness,
}

impl CaptureReader {
    /// Create a reader over the given files, read in order.
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            verbosity: 0,
            strictness: Strictness::default(),
        }
    }

    /// Set the verbosity. At 1 or above every raw line and every packet is
    /// echoed through `tracing` at debug level.
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set how unrecognized lines are treated.
    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// The files this reader covers.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Iterate over the packets in all files.
    ///
    /// Each call starts again from the first file with an empty
    /// accumulation buffer. The iterator ends after the first error.
    pub fn iterate(&self) -> Packets<'_> {
        Packets {
            reader: self,
            next_file: 0,
            current: None,
            buffer: BytesMut::new(),
            failed: false,
        }
    }

    fn verbose(&self) -> bool {
        self.verbosity >= 1
    }
}

impl<'a> IntoIterator for &'a CaptureReader {
    type Item = Result<Packet>;
    type IntoIter = Packets<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iterate()
    }
}

/// An open capture file and its position.
struct OpenFile {
    name: String,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl OpenFile {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            name: path.display().to_string(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

/// Lazy packet sequence returned by [`CaptureReader::iterate`].
pub struct Packets<'a> {
    reader: &'a CaptureReader,
    next_file: usize,
    current: Option<OpenFile>,
    buffer: BytesMut,
    failed: bool,
}

impl Packets<'_> {
    fn fail(&mut self, err: WireError) -> Option<Result<Packet>> {
        tracing::error!("{}", err);
        self.failed = true;
        self.current = None;
        Some(Err(err))
    }

    fn take_packet(&mut self, file: &str) -> Option<Packet> {
        if self.buffer.is_empty() {
            return None;
        }
        let packet = self.buffer.split().freeze();
        if self.reader.verbose() {
            tracing::debug!("{}: packet of {} bytes\n{}", file, packet.len(), HexDump(&packet));
        }
        Some(packet)
    }
}

impl Iterator for Packets<'_> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if self.current.is_none() {
                let path = self.reader.files.get(self.next_file)?;
                self.next_file += 1;
                match OpenFile::open(path) {
                    Ok(file) => self.current = Some(file),
                    Err(err) => return self.fail(err),
                }
            }
            let Some(file) = self.current.as_mut() else {
                continue;
            };

            let text = match file.lines.next() {
                Some(Ok(text)) => text,
                Some(Err(err)) => return self.fail(err.into()),
                None => {
                    // Flush out the final packet of this file.
                    let name = file.name.clone();
                    self.current = None;
                    match self.take_packet(&name) {
                        Some(packet) => return Some(Ok(packet)),
                        None => continue,
                    }
                }
            };
            file.line_no += 1;

            if self.reader.verbose() {
                tracing::debug!("{} read: {:?}", file.name, text);
            }

            match classify(&text) {
                Line::Blank => {}
                Line::Timestamp => {
                    let name = file.name.clone();
                    if let Some(packet) = self.take_packet(&name) {
                        return Some(Ok(packet));
                    }
                }
                Line::Data { offset, tokens } => {
                    if self.reader.strictness == Strictness::Strict
                        && text.ends_with(char::is_whitespace)
                    {
                        let err = WireError::UnrecognizedLine {
                            file: file.name.clone(),
                            line: file.line_no,
                            text: text.clone(),
                        };
                        return self.fail(err);
                    }
                    let expected = if offset == 0 { 0 } else { self.buffer.len() as u64 };
                    if offset != expected {
                        let err = WireError::OffsetMismatch {
                            file: file.name.clone(),
                            line: file.line_no,
                            expected,
                            actual: offset,
                        };
                        return self.fail(err);
                    }

                    let mut bytes = Vec::with_capacity(tokens.len());
                    for token in tokens {
                        match parse_byte(token) {
                            Some(byte) => bytes.push(byte),
                            None => {
                                let err = WireError::InvalidByte {
                                    file: file.name.clone(),
                                    line: file.line_no,
                                    token: token.to_string(),
                                };
                                return self.fail(err);
                            }
                        }
                    }

                    // Offset zero on a non-empty buffer starts a new packet.
                    let name = file.name.clone();
                    let completed = if offset == 0 {
                        self.take_packet(&name)
                    } else {
                        None
                    };
                    self.buffer.extend_from_slice(&bytes);
                    if let Some(packet) = completed {
                        return Some(Ok(packet));
                    }
                }
                Line::Unrecognized => {
                    if self.reader.strictness == Strictness::Strict {
                        let err = WireError::UnrecognizedLine {
                            file: file.name.clone(),
                            line: file.line_no,
                            text: text.clone(),
                        };
                        return self.fail(err);
                    }
                }
            }
        }
    }
}

impl FusedIterator for Packets<'_> {}
