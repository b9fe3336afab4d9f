//! tcp-acceptor
//!
//! Binds every configured address, logs each accepted connection and drains
//! its bytes, and shuts down gracefully on SIGINT/SIGTERM.
//!
//! ```text
//!   config.toml / --listen
//!          │
//!          ▼
//!   ┌─────────────┐   add_port*   ┌─────────────────────────────┐
//!   │    main     │──────────────▶│ Server                      │
//!   └─────────────┘    start      │  listener ─ accept cycle ─┐ │
//!          │                      │  listener ─ accept cycle ─┤ │
//!          │ signal → release     └───────────────────────────┼─┘
//!          ▼                                                  ▼
//!   wait for shutdown-complete                    on_accept(endpoint)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::oneshot;

use tcp_acceptor::config::loader::load_config;
use tcp_acceptor::config::validation::validate_config;
use tcp_acceptor::lifecycle::signals;
use tcp_acceptor::observability::{logging, metrics};
use tcp_acceptor::{AcceptorConfig, Server, TcpEndpoint};

#[derive(Parser)]
#[command(name = "tcp-acceptor")]
#[command(about = "Multi-port TCP acceptor with graceful drain", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on; repeatable. Replaces the configured addresses.
    #[arg(short, long = "listen", value_name = "ADDR")]
    listen: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AcceptorConfig::default(),
    };
    if !cli.listen.is_empty() {
        config.listeners.addresses = cli.listen.clone();
    }
    if let Err(errors) = validate_config(&config) {
        for err in &errors {
            eprintln!("invalid configuration: {}", err);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("tcp-acceptor v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (done_tx, done_rx) = oneshot::channel();
    let server = Server::builder(config.server.clone())
        .on_shutdown_complete(move || {
            let _ = done_tx.send(());
        })
        .build()?;

    for address in &config.listeners.addresses {
        let addr: SocketAddr = address.parse()?;
        match server.add_port(addr) {
            Ok(port) => tracing::info!(address = %address, port, "Listening for connections"),
            Err(err) => {
                tracing::error!(
                    address = %address,
                    os_code = ?err.os_code(),
                    error = %err,
                    "Failed to add port"
                );
                return Err(err.into());
            }
        }
    }

    server.start(|endpoint, acceptor| {
        tracing::info!(
            connection = %endpoint.name(),
            port_index = acceptor.port_index,
            "Connection accepted"
        );
        tokio::spawn(drain(endpoint));
    });

    let signal = signals::wait_for_shutdown().await?;
    tracing::info!(%signal, "Shutdown signal received");
    server.release();

    let deadline = Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(deadline, done_rx).await {
        Ok(_) => tracing::info!("Shutdown complete"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Shutdown did not complete in time, exiting"
        ),
    }
    Ok(())
}

/// Read the connection to EOF, logging how much arrived.
async fn drain(mut endpoint: TcpEndpoint) {
    let mut total = 0usize;
    loop {
        match endpoint.read_chunk().await {
            Ok(Some(chunk)) => total += chunk.len(),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(connection = %endpoint.name(), error = %e, "Read failed");
                break;
            }
        }
    }
    tracing::debug!(connection = %endpoint.name(), bytes = total, "Connection closed");
}
