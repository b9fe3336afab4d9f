//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Re-arm of an accept fails:
//!     → backoff.rs (delay for this attempt, with jitter)
//!     → server re-arms after the delay, up to max_rearm_attempts
//! ```
//!
//! # Design Decisions
//! - Exponential growth capped by rearm_max_delay_ms
//! - Jitter keeps listeners that fail together from retrying in lockstep

pub mod backoff;
