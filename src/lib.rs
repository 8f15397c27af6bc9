//! # packetwire
//!
//! Packet transport core: feeds packets from hex-dump capture files to a
//! peer over a length-prefixed TCP stream, and drains packets coming back.
//!
//! ## Architecture
//!
//! - **Capture** (`capture`): reconstructs packets from line-oriented
//!   hex-dump text files
//! - **Protocol** (`protocol`): 4-byte big-endian length framing with
//!   resumable send and receive state machines
//! - **Transport** (`transport`): non-blocking listener/connector socket
//!   whose single-attempt operations are driven by an external readiness loop
//!
//! Nothing here blocks and nothing here exits the process: transient
//! conditions come back as `false` or empty results, everything else as a
//! [`WireError`].
//!
//! ## Example
//!
//! ```ignore
//! use packetwire::capture::CaptureReader;
//! use packetwire::transport::{Role, Transport, TransportConfig};
//!
//! let reader = CaptureReader::new(["input.hex"]);
//! let mut transport = Transport::new("connect:localhost:12345".parse()?)?;
//!
//! // Driver: wait for writability, then
//! while !transport.attempt_connect()? {}
//! for packet in reader.iterate() {
//!     let mut done = transport.send(Some(packet?))?;
//!     while !done {
//!         done = transport.send(None)?;
//!     }
//! }
//! ```

pub mod capture;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod transport;

pub use error::{ErrorKind, Result, WireError};
pub use packet::Packet;
pub use protocol::Received;
pub use transport::{Role, Transport, TransportConfig};
