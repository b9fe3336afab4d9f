//! Shutdown coordination.
//!
//! Shutdown is requested once, when the last handle is released or when
//! [`Server::shutdown`](crate::Server::shutdown) is called. It completes
//! once every port has drained, and the completion callback runs exactly
//! once, with the mutex released, before the listening sockets close.

use super::acceptor::ServerId;
use super::listener::Listener;
use super::state::{Shared, ShutdownCallback, State};
use crate::observability::metrics;

/// Work left over once the last port drained. Run it with the mutex released.
#[must_use]
pub(crate) struct Finalize {
    server: ServerId,
    complete: Option<ShutdownCallback>,
    listeners: Vec<Listener>,
}

impl Finalize {
    pub(crate) fn run(self) {
        tracing::info!(server = %self.server, ports = self.listeners.len(), "Shutdown complete");
        if let Some(complete) = self.complete {
            complete();
        }
        drop(self.listeners);
    }
}

impl State {
    fn take_finalize(&mut self, server: ServerId) -> Finalize {
        assert!(!self.finalized, "server shutdown finalized twice");
        self.finalized = true;
        Finalize {
            server,
            complete: self.shutdown_complete.take(),
            listeners: std::mem::take(&mut self.listeners),
        }
    }
}

impl Shared {
    /// Retire one operation on listener `index`.
    ///
    /// When the listener has nothing left in flight it leaves `active_ports`;
    /// if that was the last port and shutdown was requested, returns the
    /// finalization work.
    pub(crate) fn finish_operation_locked(&self, state: &mut State, index: usize) -> Option<Finalize> {
        let listener = &mut state.listeners[index];
        if !listener.finish_operation() {
            return None;
        }

        if listener.shutting_down {
            tracing::debug!(server = %self.id, port_index = listener.port_index, "Listener drained");
        } else {
            tracing::warn!(
                server = %self.id,
                port_index = listener.port_index,
                "Listener stopped accepting before shutdown"
            );
        }

        assert!(state.active_ports > 0, "active port count underflow");
        state.active_ports -= 1;
        metrics::set_active_ports(state.active_ports);

        if state.active_ports == 0 && state.shutdown_requested {
            Some(state.take_finalize(self.id))
        } else {
            None
        }
    }

    /// Begin shutdown. Idempotent.
    pub(crate) fn request_shutdown(&self) {
        let finalize = {
            let mut state = self.state.lock();
            if state.shutdown_requested {
                return;
            }
            state.shutdown_requested = true;
            tracing::info!(
                server = %self.id,
                active_ports = state.active_ports,
                "Shutdown requested"
            );

            if state.active_ports == 0 {
                Some(state.take_finalize(self.id))
            } else {
                for listener in state.listeners.iter_mut() {
                    listener.begin_shutdown();
                }
                None
            }
        };
        if let Some(finalize) = finalize {
            finalize.run();
        }
    }

    /// Called when the last handle goes away.
    pub(crate) fn on_last_release(&self) {
        let starting = std::mem::take(&mut self.state.lock().shutdown_starting);
        for callback in starting {
            callback();
        }
        self.request_shutdown();
    }
}
