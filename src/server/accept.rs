//! The accept cycle.
//!
//! Each listener keeps exactly one accept armed. When it completes, the
//! connection (if any) is turned into an endpoint and delivered, then the
//! next accept is armed before the completed one is retired. That ordering
//! keeps the listener's outstanding count above zero while it is still
//! accepting, so a port only leaves `active_ports` once it has really
//! stopped.
//!
//! User callbacks and socket setup run with the server mutex released.

use std::net::TcpStream;
use std::sync::Arc;

use super::acceptor::Acceptor;
use super::listener::OpId;
use super::state::{AcceptCallback, Shared, State};
use crate::error::{Diagnostic, NotificationError};
use crate::net::endpoint::{BufferAllocator, TcpEndpoint};
use crate::net::reactor::AcceptOutcome;
use crate::net::{addr, socket};
use crate::observability::metrics;
use crate::resilience::backoff;

impl Shared {
    /// Arm the next accept on listener `index`.
    ///
    /// Does nothing once the listener is shutting down. An arm failure is
    /// retried after a backoff delay, up to `max_rearm_attempts` in a row.
    pub(crate) fn arm_locked(self: &Arc<Self>, state: &mut State, index: usize) {
        let op = state.next_op_id();
        let listener = &mut state.listeners[index];
        let err = match listener.arm(op) {
            Ok(Some(accept)) => {
                let shared = Arc::clone(self);
                self.reactor.spawn(Box::pin(async move {
                    let completion = accept.await;
                    shared.on_accept_complete(index, op, completion);
                }));
                return;
            }
            Ok(None) => return,
            Err(err) => err,
        };

        listener.rearm_failures += 1;
        metrics::record_rearm_failure();
        let attempt = listener.rearm_failures;
        let max_attempts = self.config.accept.max_rearm_attempts;

        if attempt > max_attempts {
            tracing::warn!(
                server = %self.id,
                port_index = listener.port_index,
                attempts = max_attempts,
                error = %Diagnostic(&err),
                "Giving up on arming accept, listener stops accepting"
            );
            return;
        }

        let delay = backoff::rearm_delay(attempt, &self.config.accept);
        tracing::error!(
            server = %self.id,
            port_index = listener.port_index,
            os_code = ?err.raw_os_error(),
            error = %Diagnostic(&err),
            attempt,
            delay = ?delay,
            "Failed to arm accept, retrying"
        );

        listener.begin_retry();
        let shared = Arc::clone(self);
        self.reactor.spawn(Box::pin(async move {
            tokio::time::sleep(delay).await;
            shared.on_rearm_timer(index);
        }));
    }

    fn on_rearm_timer(self: &Arc<Self>, index: usize) {
        let finalize = {
            let mut state = self.state.lock();
            self.arm_locked(&mut state, index);
            self.finish_operation_locked(&mut state, index)
        };
        if let Some(finalize) = finalize {
            finalize.run();
        }
    }

    fn on_accept_complete(
        self: &Arc<Self>,
        index: usize,
        op: OpId,
        completion: Result<AcceptOutcome, NotificationError>,
    ) {
        let delivery = {
            let mut state = self.state.lock();
            let Some(listener) = state.listeners.get_mut(index) else {
                tracing::debug!(server = %self.id, index, "Accept completed after teardown");
                return;
            };
            let port_index = listener.port_index;
            let shutting_down = listener.shutting_down;

            let outcome = match completion {
                Ok(outcome) => outcome,
                Err(err) => {
                    // The operation's result is unknown, so it is neither
                    // re-armed nor retired.
                    tracing::info!(
                        server = %self.id,
                        port_index,
                        error = %err,
                        "Skipping accept completion, notification failed"
                    );
                    return;
                }
            };
            listener.complete(op);

            match outcome {
                AcceptOutcome::Failed(err) => {
                    if !shutting_down {
                        tracing::error!(
                            server = %self.id,
                            port_index,
                            os_code = ?err.raw_os_error(),
                            error = %Diagnostic(&err),
                            "Accept failed"
                        );
                        metrics::record_accept_error();
                    }
                    None
                }
                AcceptOutcome::Connected(stream) if shutting_down => {
                    tracing::debug!(
                        server = %self.id,
                        port_index,
                        "Discarding connection accepted during shutdown"
                    );
                    metrics::record_connection_discarded();
                    drop(stream);
                    None
                }
                AcceptOutcome::Connected(stream) => state
                    .on_accept
                    .clone()
                    .map(|on_accept| (stream, Acceptor::new(self.id, port_index), on_accept)),
            }
        };

        if let Some((stream, acceptor, on_accept)) = delivery {
            self.deliver(stream, acceptor, on_accept);
        }

        let finalize = {
            let mut state = self.state.lock();
            self.arm_locked(&mut state, index);
            self.finish_operation_locked(&mut state, index)
        };
        if let Some(finalize) = finalize {
            finalize.run();
        }
    }

    fn deliver(&self, stream: TcpStream, acceptor: Acceptor, on_accept: AcceptCallback) {
        // The reactor may complete accepts on threads outside the runtime
        // the endpoint registers with.
        let _runtime = self.runtime.as_ref().map(|runtime| runtime.enter());

        if let Err(err) = socket::prepare_accepted(&stream, &self.config.socket) {
            tracing::error!(
                server = %self.id,
                port_index = acceptor.port_index,
                error = %Diagnostic(&err),
                "Failed to set options on accepted socket"
            );
        }

        let peer_addr = match stream.peer_addr() {
            Ok(peer) => Some(addr::normalize_peer(peer)),
            Err(err) => {
                tracing::error!(
                    server = %self.id,
                    port_index = acceptor.port_index,
                    os_code = ?err.raw_os_error(),
                    error = %Diagnostic(&err),
                    "getpeername failed, delivering connection without a peer address"
                );
                None
            }
        };
        let peer = peer_addr.as_ref().map(addr::to_uri).unwrap_or_default();

        let allocator = BufferAllocator::new(self.config.endpoint.read_chunk_size);
        let endpoint = match TcpEndpoint::new(stream, peer_addr, peer, allocator) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                tracing::error!(
                    server = %self.id,
                    port_index = acceptor.port_index,
                    error = %Diagnostic(&err),
                    "Failed to register accepted connection, closing it"
                );
                return;
            }
        };

        tracing::debug!(
            server = %self.id,
            port_index = acceptor.port_index,
            peer = %endpoint.peer(),
            "Connection accepted"
        );
        metrics::record_connection_accepted(acceptor.port_index);
        on_accept(endpoint, acceptor);
    }
}
