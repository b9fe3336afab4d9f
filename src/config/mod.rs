//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AcceptorConfig (validated, immutable)
//!     → ServerConfig snapshot shared via Arc by each Server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once handed to a Server; ports are fixed before start
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AcceptConfig;
pub use schema::AcceptorConfig;
pub use schema::EndpointConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
pub use schema::SocketConfig;
