//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the acceptor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the `tcp-acceptor` binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcceptorConfig {
    /// Addresses to listen on.
    pub listeners: ListenerConfig,

    /// Snapshot handed to every server the binary creates.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// How long to wait for shutdown-complete after a signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            listeners: ListenerConfig::default(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind addresses (e.g., "0.0.0.0:8080", "[::]:8080").
    /// Port 0 asks the OS for a port; later port-0 entries reuse it.
    pub addresses: Vec<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["0.0.0.0:7070".to_string()],
        }
    }
}

/// Immutable configuration snapshot owned by a [`Server`](crate::Server).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Options for listening and accepted sockets.
    pub socket: SocketConfig,

    /// Accept loop tuning.
    pub accept: AcceptConfig,

    /// Buffer strategy handed to each endpoint.
    pub endpoint: EndpointConfig,
}

/// Socket options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Listen backlog. `None` requests the OS maximum.
    pub listen_backlog: Option<i32>,

    /// Set SO_REUSEPORT on listening sockets bound to an explicit port
    /// (Unix only). Listeners on port 0 always share their port within a
    /// server, so leave this off unless several processes must split one port.
    pub reuse_port: bool,

    /// Disable Nagle on accepted sockets.
    pub nodelay: bool,

    /// TCP keepalive idle time for accepted sockets, in seconds.
    pub keepalive_secs: Option<u64>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            listen_backlog: None,
            reuse_port: false,
            nodelay: true,
            keepalive_secs: None,
        }
    }
}

/// Accept loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcceptConfig {
    /// Consecutive re-arm failures tolerated before a listener stops accepting.
    pub max_rearm_attempts: u32,

    /// Base delay for re-arm backoff in milliseconds.
    pub rearm_base_delay_ms: u64,

    /// Maximum delay for re-arm backoff in milliseconds.
    pub rearm_max_delay_ms: u64,
}

impl Default for AcceptConfig {
    fn default() -> Self {
        Self {
            max_rearm_attempts: 5,
            rearm_base_delay_ms: 10,
            rearm_max_delay_ms: 1000,
        }
    }
}

/// Endpoint buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Size of each read buffer handed out by the endpoint allocator.
    pub read_chunk_size: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 8192,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
