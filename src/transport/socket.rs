//! Framed, non-blocking TCP transport.
//!
//! Every operation performs at most one system call and returns at once.
//! The caller waits on [`Transport::readiness_handle`] with its own
//! readiness loop and calls back in when the socket is readable/writable.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use packetwire::transport::{Role, Transport, TransportConfig};
//!
//! let mut transport = Transport::new(TransportConfig::new(Role::Connector).port(12345))?;
//! while !transport.attempt_connect()? {
//!     // wait for writability
//! }
//! let mut done = transport.send(Some(Bytes::from_static(b"packet")))?;
//! while !done {
//!     // wait for writability
//!     done = transport.send(None)?;
//! }
//! # Ok::<(), packetwire::WireError>(())
//! ```

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::config::{Role, TransportConfig};
use crate::error::{Result, WireError};
use crate::packet::Packet;
use crate::protocol::{FrameBuffer, Received, SendCursor};

/// Listen backlog; only one connection is ever accepted.
const LISTEN_BACKLOG: i32 = 1;

/// Whether a TCP socket may `connect()` again after a refused attempt.
/// Elsewhere a fresh socket replaces it, which changes the readiness handle.
const RECONNECT_SAME_SOCKET: bool = cfg!(any(target_os = "linux", target_os = "android"));

/// Connection progress. Never goes back to `Unconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unconnected,
    Connected,
}

/// One framed stream connection, as listener or connector.
#[derive(Debug)]
pub struct Transport {
    role: Role,
    hostname: String,
    port: u16,
    mtu: u32,
    timeout: Duration,
    verbosity: u8,
    /// Listening socket, connecting socket, or the accepted connection.
    socket: Socket,
    /// Address to connect to (connector only).
    remote: Option<SocketAddr>,
    state: State,
    send: SendCursor,
    recv: FrameBuffer,
}

impl Transport {
    /// Create the socket for the configured role.
    ///
    /// A listener binds and listens immediately; the resolved hostname and
    /// port come from the bound address. A connector asked for port 0 binds
    /// a throwaway socket to obtain an ephemeral port, closes it, and will
    /// connect to that port. The socket is non-blocking on return.
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let addr = resolve(&config.hostname, config.port)?;

        let (socket, hostname, port, remote) = match config.role {
            Role::Listener => {
                let socket = new_socket(addr)?;
                socket.bind(&addr.into())?;
                socket.listen(LISTEN_BACKLOG)?;
                let bound = local_addr(&socket)?;
                (socket, bound.ip().to_string(), bound.port(), None)
            }
            Role::Connector => {
                let (hostname, target) = if addr.port() == 0 {
                    let throwaway = new_socket(addr)?;
                    throwaway.bind(&addr.into())?;
                    let bound = local_addr(&throwaway)?;
                    drop(throwaway);
                    (bound.ip().to_string(), bound)
                } else {
                    (config.hostname.clone(), addr)
                };
                let socket = new_socket(target)?;
                (socket, hostname, target.port(), Some(target))
            }
        };
        socket.set_nonblocking(true)?;

        if config.verbosity >= 1 {
            tracing::debug!("Created {} socket for {}:{}", config.role, hostname, port);
        }

        Ok(Self {
            role: config.role,
            hostname,
            port,
            mtu: config.mtu,
            timeout: config.timeout_duration(),
            verbosity: config.verbosity,
            socket,
            remote,
            state: State::Unconnected,
            send: SendCursor::new(config.mtu),
            recv: FrameBuffer::new(config.mtu),
        })
    }

    /// Resolved hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Resolved port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Listener or connector.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Maximum payload length.
    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    /// Configured timeout. Not enforced here; the driver applies it.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once `attempt_connect` has succeeded.
    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// True when `send(Some(..))` may be called.
    pub fn is_send_idle(&self) -> bool {
        self.send.is_idle()
    }

    /// True once `receive` has reported end of stream.
    pub fn is_closed(&self) -> bool {
        self.recv.is_closed()
    }

    /// Address of the connected peer, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        if !self.is_connected() {
            return None;
        }
        self.socket.peer_addr().ok().and_then(|addr| addr.as_socket())
    }

    /// Raw descriptor for registration with a readiness multiplexer.
    ///
    /// The descriptor changes when a listener accepts its connection, so
    /// re-register after `attempt_connect` returns true. A connector keeps
    /// its descriptor across refused attempts on Linux; on other platforms
    /// a refused attempt replaces the socket and the handle must be fetched
    /// again after every `attempt_connect`.
    #[cfg(unix)]
    pub fn readiness_handle(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.socket.as_raw_fd()
    }

    /// Make one attempt to complete the connection.
    ///
    /// A connector issues one non-blocking connect; a listener one
    /// non-blocking accept. Returns `Ok(false)` while the connection is not
    /// yet there (connect in progress, refused or reset; no pending
    /// connection), in which case the caller tries again on the next
    /// readiness signal.
    ///
    /// # Errors
    ///
    /// - [`WireError::Precondition`] if already connected
    /// - [`WireError::Io`] for any unexpected socket error
    pub fn attempt_connect(&mut self) -> Result<bool> {
        if self.is_connected() {
            return Err(WireError::Precondition(
                "attempt_connect called on a connected transport",
            ));
        }
        match self.role {
            Role::Connector => self.try_connect(),
            Role::Listener => self.try_accept(),
        }
    }

    fn try_connect(&mut self) -> Result<bool> {
        let Some(remote) = self.remote else {
            return Err(WireError::Precondition("connector without a remote address"));
        };

        match self.socket.connect(&SockAddr::from(remote)) {
            Ok(()) => {}
            Err(e) if already_connected(&e) => {}
            Err(e) if connect_in_progress(&e) => return Ok(false),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                ) =>
            {
                if self.verbosity >= 1 {
                    tracing::debug!("Connect to {} failed: {}", remote, e);
                }
                if !RECONNECT_SAME_SOCKET {
                    let socket = new_socket(remote)?;
                    socket.set_nonblocking(true)?;
                    self.socket = socket;
                }
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        self.state = State::Connected;
        if self.verbosity >= 1 {
            tracing::debug!("Connected to {}", remote);
        }
        Ok(true)
    }

    fn try_accept(&mut self) -> Result<bool> {
        match self.socket.accept() {
            Ok((conn, peer)) => {
                conn.set_nonblocking(true)?;
                self.socket = conn;
                self.state = State::Connected;
                if self.verbosity >= 1 {
                    tracing::debug!("Accepted connection from {:?}", peer.as_socket());
                }
                Ok(true)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionAborted
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send a new packet, or continue sending the current one.
    ///
    /// Pass `Some(packet)` only when the previous packet has been fully sent,
    /// and `None` to continue a packet in flight. Performs one vectored
    /// write. Returns `Ok(true)` when ready for the next packet, `Ok(false)`
    /// if the caller must call `send(None)` again once writable.
    ///
    /// # Errors
    ///
    /// - [`WireError::Precondition`] on misuse (not connected, new packet
    ///   while one is in flight, continuation with nothing in flight)
    /// - [`WireError::PayloadTooLarge`] if the packet exceeds the MTU
    /// - [`WireError::Io`] for any unexpected socket error
    pub fn send(&mut self, packet: Option<Packet>) -> Result<bool> {
        self.ensure_connected()?;

        match packet {
            Some(packet) => {
                if self.verbosity >= 1 {
                    tracing::debug!("Sending packet length {}", packet.len());
                }
                self.send.submit(packet)?;
            }
            None => {
                if self.verbosity >= 1 {
                    tracing::debug!("Continuing send");
                }
            }
        }

        let mut stream = &self.socket;
        let done = self.send.write_to(&mut stream)?;
        if self.verbosity >= 1 {
            if done {
                tracing::debug!("Ready to send next packet");
            } else {
                tracing::debug!("{} bytes left to send", self.send.pending_bytes());
            }
        }
        Ok(done)
    }

    /// Perform one read and return the packets it completes.
    ///
    /// When [`Received::end_of_stream`] is set the peer has closed the
    /// connection and `receive` must not be called again.
    ///
    /// # Errors
    ///
    /// - [`WireError::Precondition`] if not connected or after end of stream
    /// - [`WireError::PayloadTooLarge`] if a frame exceeds the MTU
    /// - [`WireError::Io`] for any unexpected socket error
    pub fn receive(&mut self) -> Result<Received> {
        self.ensure_connected()?;

        let mut stream = &self.socket;
        let received = self.recv.read_from(&mut stream)?;
        if self.verbosity >= 1 {
            if received.end_of_stream {
                tracing::debug!("Receive reached end of stream");
            } else {
                tracing::debug!(
                    "Received {} packets, {} bytes buffered",
                    received.packets.len(),
                    self.recv.buffered()
                );
            }
        }
        Ok(received)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(WireError::Precondition("transport is not connected"))
        }
    }
}

#[cfg(unix)]
impl std::os::unix::io::AsRawFd for Transport {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.readiness_handle()
    }
}

#[cfg(unix)]
impl std::os::fd::AsFd for Transport {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        std::os::fd::AsFd::as_fd(&self.socket)
    }
}

/// Resolve a hostname, preferring IPv4 addresses.
fn resolve(hostname: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (hostname, port)
        .to_socket_addrs()
        .map_err(|e| WireError::Address(format!("cannot resolve {}: {}", hostname, e)))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| WireError::Address(format!("no addresses for {}", hostname)))
}

fn new_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    Ok(socket)
}

fn local_addr(socket: &Socket) -> io::Result<SocketAddr> {
    socket.local_addr()?.as_socket().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "bound address is not an IP address")
    })
}

fn connect_in_progress(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    ) {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            err.raw_os_error(),
            Some(libc::EINPROGRESS) | Some(libc::EALREADY)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn already_connected(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EISCONN)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}
