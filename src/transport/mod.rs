//! Transport module - framed TCP connection driven by an external
//! readiness loop.
//!
//! Provides:
//! - Configuration (role, endpoint, MTU) with JSON and endpoint-string forms
//! - The non-blocking [`Transport`] itself

mod config;
mod socket;

pub use config::{Role, TransportConfig, DEFAULT_HOSTNAME, DEFAULT_TIMEOUT_MS};
pub use socket::Transport;
