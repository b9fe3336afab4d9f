//! Per-port listener state.
//!
//! A listener owns its listening socket (through the reactor's
//! [`AcceptSource`]) and counts the operations still in flight for it: armed
//! accepts and pending re-arm retries. All fields are only touched with the
//! server mutex held.

use std::io;
use std::net::SocketAddr;

use crate::net::reactor::{AcceptFuture, AcceptSource};

/// Identifies one armed accept.
pub(crate) type OpId = u64;

pub(crate) struct Listener {
    source: Box<dyn AcceptSource>,
    pub(crate) local_addr: SocketAddr,
    pub(crate) port_index: usize,
    pub(crate) shutting_down: bool,
    pub(crate) outstanding: usize,
    /// The accept currently armed, if any.
    pending: Option<OpId>,
    /// Consecutive failed arm attempts.
    pub(crate) rearm_failures: u32,
}

impl Listener {
    pub(crate) fn new(source: Box<dyn AcceptSource>, local_addr: SocketAddr, port_index: usize) -> Self {
        Self {
            source,
            local_addr,
            port_index,
            shutting_down: false,
            outstanding: 0,
            pending: None,
            rearm_failures: 0,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Concrete port the OS currently reports for the socket, if positive.
    pub(crate) fn os_port(&self) -> Option<u16> {
        self.source
            .local_addr()
            .ok()
            .map(|addr| addr.port())
            .filter(|port| *port > 0)
    }

    /// Submit the next accept. `Ok(None)` when shutting down: nothing is armed.
    pub(crate) fn arm(&mut self, op: OpId) -> io::Result<Option<AcceptFuture>> {
        if self.shutting_down {
            return Ok(None);
        }
        let accept = self.source.arm()?;
        debug_assert!(self.pending.is_none(), "second accept armed on one listener");
        self.pending = Some(op);
        self.outstanding += 1;
        self.rearm_failures = 0;
        Ok(Some(accept))
    }

    /// Record that the armed accept `op` has reported its result.
    pub(crate) fn complete(&mut self, op: OpId) {
        let pending = self.pending.take();
        debug_assert_eq!(pending, Some(op), "completion for an accept that was not armed");
    }

    /// Count a re-arm retry as an operation in flight.
    pub(crate) fn begin_retry(&mut self) {
        self.outstanding += 1;
    }

    /// Mark the listener shutting down and cancel its accepts. Irreversible.
    pub(crate) fn begin_shutdown(&mut self) {
        if !self.shutting_down {
            self.shutting_down = true;
            self.source.cancel();
        }
    }

    /// Retire one operation; returns true when none remain.
    pub(crate) fn finish_operation(&mut self) -> bool {
        assert!(self.outstanding > 0, "outstanding accept count underflow");
        self.outstanding -= 1;
        self.outstanding == 0
    }
}
