//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use tcp_acceptor::{Acceptor, Server, ServerConfig, TcpEndpoint};

/// Server configuration with short re-arm delays.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.accept.rearm_base_delay_ms = 1;
    config.accept.rearm_max_delay_ms = 10;
    config
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Whether this host can bind an IPv6 loopback socket.
#[allow(dead_code)]
pub fn ipv6_available() -> bool {
    std::net::TcpListener::bind("[::1]:0").is_ok()
}

/// Build a server whose shutdown-complete callback fires the returned receiver.
pub fn server_with_completion(config: ServerConfig) -> (Server, oneshot::Receiver<()>) {
    let (done_tx, done_rx) = oneshot::channel();
    let server = Server::builder(config)
        .on_shutdown_complete(move || {
            let _ = done_tx.send(());
        })
        .build()
        .unwrap();
    (server, done_rx)
}

/// Start `server` with a callback that forwards every connection.
#[allow(dead_code)]
pub fn start_collecting(server: &Server) -> mpsc::UnboundedReceiver<(TcpEndpoint, Acceptor)> {
    let (tx, rx) = mpsc::unbounded_channel();
    server.start(move |endpoint, acceptor| {
        let _ = tx.send((endpoint, acceptor));
    });
    rx
}

/// Receive the next item, failing the test after five seconds.
#[allow(dead_code)]
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("accept channel closed")
}

/// Wait for shutdown-complete, failing the test after five seconds.
pub async fn wait_complete(done_rx: oneshot::Receiver<()>) {
    tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .expect("shutdown did not complete")
        .expect("shutdown-complete callback dropped without running");
}
