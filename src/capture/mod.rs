//! Capture module - hex-dump capture files.
//!
//! This module implements the line-oriented capture text format:
//! - Line classification (blank/comment, timestamp, data)
//! - A lazy packet reader over a list of files
//! - A writer producing the same format

mod line;
mod reader;
mod writer;

pub use line::{classify, parse_byte, Line, COMMENT_MARKER};
pub use reader::{CaptureReader, Packets, Strictness};
pub use writer::CaptureWriter;
