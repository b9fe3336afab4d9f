//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server, listeners, accept cycle produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (server, port_index, peer, os_code) on every event
//! - Metrics are cheap and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
