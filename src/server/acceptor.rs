//! Identity of a server and of the port that produced a connection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for server IDs.
/// Relaxed ordering is enough since only uniqueness matters.
static SERVER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(u64);

impl ServerId {
    pub(crate) fn next() -> Self {
        Self(SERVER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server-{}", self.0)
    }
}

/// Describes where a delivered connection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceptor {
    /// Server that accepted the connection.
    pub from_server: ServerId,
    /// Position of the listener among the server's ports, in registration order.
    pub port_index: usize,
    /// Socket index within the port; always 0, each port has one socket.
    pub fd_index: usize,
    /// True only for connections injected from outside the accept loop.
    pub external_connection: bool,
}

impl Acceptor {
    pub(crate) fn new(from_server: ServerId, port_index: usize) -> Self {
        Self {
            from_server,
            port_index,
            fd_index: 0,
            external_connection: false,
        }
    }
}
