//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Requested bind address
//!     → addr.rs (v4-mapped / wildcard normalization)
//!     → socket.rs (create, options, bind, listen, bound port)
//!     → reactor.rs (register with the completion backend)
//!
//! Completed accept
//!     → socket.rs (options on the accepted socket)
//!     → endpoint.rs (owned endpoint handed to the callback)
//! ```
//!
//! # Design Decisions
//! - Listening sockets are IPv6 dual-stack so one family serves both
//! - The completion backend is a trait; tokio is the default implementation
//! - Ownership of an accepted socket leaves the engine with the endpoint

pub mod addr;
pub mod endpoint;
pub mod reactor;
pub mod socket;
