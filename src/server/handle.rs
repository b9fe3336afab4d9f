//! Public server handle and builder.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::runtime::Handle as RuntimeHandle;

use super::acceptor::{Acceptor, ServerId};
use super::listener::Listener;
use super::state::{Shared, ShutdownCallback};
use crate::config::ServerConfig;
use crate::error::{AddPortError, BuildError};
use crate::net::endpoint::TcpEndpoint;
use crate::net::reactor::{Reactor, TokioReactor};
use crate::net::{addr, socket};
use crate::observability::metrics;

/// A TCP server accepting on any number of ports.
///
/// `Server` is a reference-counted handle. Cloning it (or calling
/// [`acquire`](Self::acquire)) adds a reference; dropping it (or calling
/// [`release`](Self::release)) removes one. When the last reference goes,
/// the shutdown-starting callbacks run and shutdown begins. Once every port
/// has drained, the shutdown-complete callback runs exactly once.
#[derive(Clone)]
pub struct Server {
    handle: Arc<Handle>,
}

/// Owned by every `Server` clone; dropping the last one starts shutdown.
struct Handle {
    shared: Arc<Shared>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.on_last_release();
    }
}

/// Builds a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    reactor: Option<Arc<dyn Reactor>>,
    runtime: Option<RuntimeHandle>,
    shutdown_complete: Option<ShutdownCallback>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            reactor: None,
            runtime: None,
            shutdown_complete: None,
        }
    }

    /// Use `reactor` for socket registration and completions.
    /// Defaults to the tokio runtime the builder runs on.
    pub fn reactor(mut self, reactor: Arc<dyn Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Register accepted connections with `runtime`.
    ///
    /// Defaults to the tokio runtime the builder runs on. Needed when the
    /// reactor completes accepts on threads outside any tokio runtime.
    pub fn runtime(mut self, runtime: RuntimeHandle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Run `callback` once shutdown has completed.
    pub fn on_shutdown_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shutdown_complete = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<Server, BuildError> {
        let runtime = self.runtime.or_else(|| RuntimeHandle::try_current().ok());
        let reactor: Arc<dyn Reactor> = match (self.reactor, &runtime) {
            (Some(reactor), _) => reactor,
            (None, Some(runtime)) => Arc::new(TokioReactor::new(runtime.clone())),
            (None, None) => Arc::new(TokioReactor::try_current()?),
        };
        if runtime.is_none() {
            tracing::warn!("No tokio runtime for accepted connections, relying on the reactor's threads");
        }
        let shared = Shared::new(
            Arc::new(self.config),
            reactor,
            runtime,
            self.shutdown_complete,
        );
        tracing::debug!(server = %shared.id, "Server created");
        Ok(Server {
            handle: Arc::new(Handle {
                shared: Arc::new(shared),
            }),
        })
    }
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Create a server on the current tokio runtime with one reference.
    pub fn create(
        config: ServerConfig,
        shutdown_complete: Option<ShutdownCallback>,
    ) -> Result<Server, BuildError> {
        let mut builder = ServerBuilder::new(config);
        builder.shutdown_complete = shutdown_complete;
        builder.build()
    }

    pub fn id(&self) -> ServerId {
        self.shared().id
    }

    /// Bind a listening socket for `addr` and return the port it bound.
    ///
    /// IPv4 addresses are bound as their IPv4-mapped IPv6 form and wildcard
    /// addresses as `[::]`, so one socket serves both families where the
    /// host allows it. Port 0 reuses the port of an earlier listener, if
    /// any, so all ephemeral listeners of a server share one port.
    ///
    /// # Panics
    ///
    /// If the server has already been started or shut down.
    pub fn add_port(&self, addr: SocketAddr) -> Result<u16, AddPortError> {
        let shared = self.shared();
        let _registration = shared.registration.lock();
        let ephemeral = addr.port() == 0;
        let mut requested = addr;
        {
            let state = shared.state.lock();
            assert!(!state.started, "ports must be added before the server starts");
            assert!(!state.finalized, "ports cannot be added to a shut down server");
            if requested.port() == 0 {
                if let Some(port) = state.listeners.iter().find_map(Listener::os_port) {
                    requested.set_port(port);
                }
            }
        }

        let target = addr::normalize(requested);
        let bound = match socket::bind_listener(target, &shared.config.socket, ephemeral) {
            Ok(bound) => bound,
            Err(err) => {
                tracing::debug!(server = %shared.id, error = %err, "Failed to add port");
                return Err(err.into());
            }
        };
        let port = bound.port();
        let local_addr = bound.local_addr;
        let source = shared
            .reactor
            .register(bound.listener)
            .map_err(|source| AddPortError::Register {
                target: addr::to_uri(&target),
                source,
            })?;

        let mut state = shared.state.lock();
        assert!(!state.started, "ports must be added before the server starts");
        let port_index = state.listeners.last().map_or(0, |last| last.port_index + 1);
        state
            .listeners
            .push(Listener::new(source, local_addr, port_index));
        tracing::info!(
            server = %shared.id,
            address = %addr::to_uri(&local_addr),
            port,
            port_index,
            "Listener bound"
        );
        Ok(port)
    }

    /// Begin accepting on every added port.
    ///
    /// `on_accept` runs once per accepted connection, on a reactor task and
    /// never with internal locks held. It owns the endpoint it receives.
    ///
    /// # Panics
    ///
    /// If the server was already started or shutdown was already requested.
    pub fn start<F>(&self, on_accept: F)
    where
        F: Fn(TcpEndpoint, Acceptor) + Send + Sync + 'static,
    {
        let shared = self.shared();
        let mut state = shared.state.lock();
        assert!(!state.started, "server already started");
        assert!(
            !state.shutdown_requested,
            "server cannot start after shutdown was requested"
        );
        assert_eq!(state.active_ports, 0, "ports active before start");

        state.started = true;
        state.on_accept = Some(Arc::new(on_accept));
        for index in 0..state.listeners.len() {
            shared.arm_locked(&mut state, index);
            if state.listeners[index].outstanding > 0 {
                state.active_ports += 1;
            }
        }
        metrics::set_active_ports(state.active_ports);
        tracing::info!(
            server = %shared.id,
            ports = state.listeners.len(),
            active_ports = state.active_ports,
            "Server started"
        );
    }

    /// Register `callback` to run when the last reference is released,
    /// before shutdown begins.
    pub fn notify_on_shutdown_starting<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared().state.lock().shutdown_starting.push(Box::new(callback));
    }

    /// Begin shutdown without waiting for the last reference. Idempotent.
    ///
    /// Shutdown-starting callbacks still run only on the last release.
    pub fn shutdown(&self) {
        self.shared().request_shutdown();
    }

    /// Add a reference.
    pub fn acquire(&self) -> Server {
        self.clone()
    }

    /// Drop a reference. Releasing the last one begins shutdown.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live references.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.handle)
    }

    /// Bound ports in registration order. Empty once shutdown has completed.
    pub fn ports(&self) -> Vec<u16> {
        self.shared()
            .state
            .lock()
            .listeners
            .iter()
            .map(Listener::port)
            .collect()
    }

    /// Ports with an accept (or a re-arm retry) still in flight.
    pub fn active_ports(&self) -> usize {
        self.shared().state.lock().active_ports
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shared().state.lock().shutdown_requested
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared().state.lock();
        f.debug_struct("Server")
            .field("id", &self.shared().id)
            .field("ports", &state.listeners.len())
            .field("active_ports", &state.active_ports)
            .field("started", &state.started)
            .field("shutdown_requested", &state.shutdown_requested)
            .finish()
    }
}
