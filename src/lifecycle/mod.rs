//! Process lifecycle for the `tcp-acceptor` binary.
//!
//! # Data Flow
//! ```text
//! SIGTERM/SIGINT (signals.rs)
//!     → main releases its server reference
//!     → server cancels every listener and drains
//!     → shutdown-complete callback fires → process exits
//! ```
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Exit is bounded: main stops waiting for the drain after a deadline

pub mod signals;
