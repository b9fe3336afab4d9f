//! TCP server subsystem.
//!
//! # Lifecycle
//! ```text
//! create ──► add_port* ──► start ──► (accepting) ──► last release
//!                                                        │
//!            shutdown-starting callbacks ◄───────────────┘
//!                     │
//!            cancel every listener, wait for each to drain
//!                     │
//!            shutdown-complete callback (exactly once), sockets closed
//! ```
//!
//! # Design Decisions
//! - The handle is reference counted through `Arc`; dropping the last clone starts shutdown
//! - A port counts as active while it has an accept or a re-arm retry in flight
//! - Callbacks run with the server mutex released
//! - Protocol violations (add_port after start, double start) panic

mod accept;
mod acceptor;
mod handle;
mod listener;
mod shutdown;
mod state;

#[cfg(test)]
mod tests;

pub use acceptor::{Acceptor, ServerId};
pub use handle::{Server, ServerBuilder};
pub use state::ShutdownCallback;
