//! Error types shared across the engine.
//!
//! # Taxonomy
//! ```text
//! contract violation   → panic (caller bug, see server::Server)
//! socket preparation   → PrepareSocketError → AddPortError (returned by add_port)
//! steady-state accept  → logged with a Diagnostic, never returned
//! completion teardown  → NotificationError ("nothing to do")
//! ```

use std::fmt;
use std::io;

use thiserror::Error;

/// The socket call that failed while preparing a listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOp {
    Socket,
    SetSockOpt,
    Bind,
    Listen,
    GetSockName,
}

impl fmt::Display for SocketOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketOp::Socket => "socket",
            SocketOp::SetSockOpt => "setsockopt",
            SocketOp::Bind => "bind",
            SocketOp::Listen => "listen",
            SocketOp::GetSockName => "getsockname",
        };
        f.write_str(name)
    }
}

/// Failed to prepare server socket.
///
/// The partially constructed socket has already been closed when this error
/// is returned; `fd` is kept for diagnostics only.
#[derive(Debug, Error)]
#[error("failed to prepare server socket for {target}: {op} failed: {}", Diagnostic(.source))]
pub struct PrepareSocketError {
    /// Target address in URI form, e.g. `ipv6:[::]:8080`.
    pub target: String,
    /// Raw OS handle of the socket, when one had been created.
    pub fd: Option<i64>,
    pub op: SocketOp,
    #[source]
    pub source: io::Error,
}

impl PrepareSocketError {
    /// Whether retrying with the plain IPv4 form of the address could help.
    ///
    /// True when the IPv6 socket itself is unusable on this host, not when
    /// the address is busy.
    pub fn ipv6_unavailable(&self) -> bool {
        match self.op {
            SocketOp::Socket => true,
            SocketOp::SetSockOpt => false,
            SocketOp::Bind => matches!(
                self.source.kind(),
                io::ErrorKind::AddrNotAvailable | io::ErrorKind::Unsupported
            ),
            SocketOp::Listen | SocketOp::GetSockName => false,
        }
    }
}

/// Error returned by [`Server::add_port`](crate::Server::add_port).
#[derive(Debug, Error)]
pub enum AddPortError {
    #[error("failed to add port to server: {0}")]
    Prepare(#[from] PrepareSocketError),

    #[error("failed to add port to server: reactor rejected listener for {target}: {}", Diagnostic(.source))]
    Register {
        target: String,
        #[source]
        source: io::Error,
    },
}

impl AddPortError {
    /// Target address in URI form.
    pub fn target(&self) -> &str {
        match self {
            AddPortError::Prepare(e) => &e.target,
            AddPortError::Register { target, .. } => target,
        }
    }

    /// Platform error code of the underlying failure, if the OS reported one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            AddPortError::Prepare(e) => e.source.raw_os_error(),
            AddPortError::Register { source, .. } => source.raw_os_error(),
        }
    }
}

/// Error returned when building a [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no reactor configured and no tokio runtime is running: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// The completion mechanism failed instead of reporting an accept result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("completion channel closed")]
    Closed,
    #[error("completion mechanism failed: {0}")]
    Other(String),
}

/// Display adapter that renders an I/O error together with its OS code.
///
/// `tracing` fields use this so every logged failure carries the platform
/// code that produced it.
pub struct Diagnostic<'a>(pub &'a io::Error);

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.raw_os_error() {
            // io::Error's own Display already appends "(os error N)".
            Some(_) => write!(f, "{}", self.0),
            None => write!(f, "{} ({:?})", self.0, self.0.kind()),
        }
    }
}
