//! Multi-port TCP acceptor library.
//!
//! A [`Server`] binds any number of listening ports, keeps one accept in
//! flight on each, hands every accepted connection to a user callback as a
//! [`TcpEndpoint`], and shuts down once its last reference is released and
//! every port has drained.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod server;

pub use config::{AcceptorConfig, ServerConfig};
pub use error::{AddPortError, BuildError, PrepareSocketError};
pub use net::endpoint::TcpEndpoint;
pub use server::{Acceptor, Server, ServerBuilder, ServerId};
