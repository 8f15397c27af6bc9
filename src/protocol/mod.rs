//! Protocol module - wire format and framing state machines.
//!
//! This module implements the length-prefixed framing:
//! - 4-byte header encoding/decoding
//! - Send cursor for resuming partial vectored writes
//! - Frame buffer for reassembling partial vectored reads

mod frame;
mod frame_buffer;
mod send_cursor;
mod wire_format;

pub use frame::{build_frame, build_frame_parts};
pub use frame_buffer::{FrameBuffer, Received};
pub use send_cursor::SendCursor;
pub use wire_format::{
    decode_header, encode_header, validate_length, DEFAULT_MTU, HEADER_SIZE, SCRATCH_SIZE,
};
