//! Shared server state guarded by the server mutex.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::acceptor::{Acceptor, ServerId};
use super::listener::{Listener, OpId};
use crate::config::ServerConfig;
use crate::net::endpoint::TcpEndpoint;
use crate::net::reactor::Reactor;

/// Callback receiving each accepted connection.
pub(crate) type AcceptCallback = Arc<dyn Fn(TcpEndpoint, Acceptor) + Send + Sync + 'static>;

/// One-shot lifecycle callback.
pub type ShutdownCallback = Box<dyn FnOnce() + Send + 'static>;

/// Everything the handle, the accept tasks and the retry timers share.
pub(crate) struct Shared {
    pub(crate) id: ServerId,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) reactor: Arc<dyn Reactor>,
    /// Runtime accepted connections are registered with.
    pub(crate) runtime: Option<Handle>,
    /// Held across the whole of `add_port` so port-0 lookups see every
    /// listener bound before them.
    pub(crate) registration: Mutex<()>,
    pub(crate) state: Mutex<State>,
}

pub(crate) struct State {
    pub(crate) listeners: Vec<Listener>,
    /// Listeners with at least one operation in flight.
    pub(crate) active_ports: usize,
    pub(crate) on_accept: Option<AcceptCallback>,
    pub(crate) started: bool,
    pub(crate) shutdown_requested: bool,
    pub(crate) finalized: bool,
    pub(crate) shutdown_starting: Vec<ShutdownCallback>,
    pub(crate) shutdown_complete: Option<ShutdownCallback>,
    next_op: OpId,
}

impl Shared {
    pub(crate) fn new(
        config: Arc<ServerConfig>,
        reactor: Arc<dyn Reactor>,
        runtime: Option<Handle>,
        shutdown_complete: Option<ShutdownCallback>,
    ) -> Self {
        Self {
            id: ServerId::next(),
            config,
            reactor,
            runtime,
            registration: Mutex::new(()),
            state: Mutex::new(State {
                listeners: Vec::new(),
                active_ports: 0,
                on_accept: None,
                started: false,
                shutdown_requested: false,
                finalized: false,
                shutdown_starting: Vec::new(),
                shutdown_complete,
                next_op: 0,
            }),
        }
    }
}

impl State {
    pub(crate) fn next_op_id(&mut self) -> OpId {
        self.next_op += 1;
        self.next_op
    }
}
