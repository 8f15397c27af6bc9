//! Transport configuration.
//!
//! A [`TransportConfig`] can be built in code, deserialized from JSON, or
//! parsed from an endpoint string of the form
//! `<flags>:[<hostname>:]<port>`, for example `listen:0` or
//! `connect:localhost:12345`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};
use crate::protocol::DEFAULT_MTU;

/// Default hostname.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Default timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Which end of the connection this transport is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Binds, listens and accepts one connection.
    #[serde(rename = "listen")]
    Listener,
    /// Initiates the connection.
    #[serde(rename = "connect")]
    Connector,
}

impl Role {
    /// Flag name used in endpoint strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Listener => "listen",
            Role::Connector => "connect",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Hostname or address to bind or connect to.
    pub hostname: String,
    /// Port; 0 lets the operating system choose.
    pub port: u16,
    /// Listener or connector.
    pub role: Role,
    /// Maximum payload length.
    pub mtu: u32,
    /// Timeout in milliseconds. Not enforced by the transport; the driver
    /// applies it around its own polling loop.
    pub timeout_ms: u64,
    /// Diagnostic echo level; 1 or above logs send/receive progress.
    pub verbosity: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: 0,
            role: Role::Listener,
            mtu: DEFAULT_MTU,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            verbosity: 0,
        }
    }
}

impl TransportConfig {
    /// Create a configuration for the given role with default settings.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WireError::Config(e.to_string()))
    }

    /// Set the hostname.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the MTU.
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the verbosity.
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// The timeout as a duration.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the configuration before any socket is created.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(WireError::Config("hostname must not be empty".to_string()));
        }
        if self.mtu == 0 {
            return Err(WireError::Config("MTU must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl FromStr for TransportConfig {
    type Err = WireError;

    /// Parse `<flags>:[<hostname>:]<port>`.
    ///
    /// Flags are comma separated and must include exactly one of `listen`
    /// and `connect`.
    fn from_str(s: &str) -> Result<Self> {
        let (flags, address) = s
            .split_once(':')
            .ok_or_else(|| WireError::Address(format!("missing ':' in endpoint {:?}", s)))?;

        let mut role = None;
        for flag in flags.split(',').filter(|flag| !flag.is_empty()) {
            let parsed = match flag {
                "listen" => Role::Listener,
                "connect" => Role::Connector,
                other => {
                    return Err(WireError::Address(format!("unknown endpoint flag {:?}", other)))
                }
            };
            if role.is_some_and(|existing| existing != parsed) {
                return Err(WireError::Address(
                    "endpoint cannot use both listen and connect".to_string(),
                ));
            }
            role = Some(parsed);
        }
        let role = role.ok_or_else(|| {
            WireError::Address(format!("endpoint {:?} needs listen or connect", s))
        })?;

        // The port follows the last ':' so IPv6 literals keep their colons.
        let (hostname, port) = match address.rsplit_once(':') {
            Some((hostname, port)) => (hostname, port),
            None => (DEFAULT_HOSTNAME, address),
        };
        let hostname = hostname.trim_start_matches('[').trim_end_matches(']');
        let hostname = if hostname.is_empty() {
            DEFAULT_HOSTNAME
        } else {
            hostname
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| WireError::Address(format!("invalid port {:?}", port)))?;

        Ok(TransportConfig::new(role).hostname(hostname).port(port))
    }
}
