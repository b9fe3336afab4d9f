use std::collections::VecDeque;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::*;
use crate::config::ServerConfig;
use crate::error::NotificationError;
use crate::net::reactor::{AcceptFuture, AcceptOutcome, AcceptSource, Reactor, Task};

type Completion = Result<AcceptOutcome, NotificationError>;

/// Reactor whose accepts complete only when the test says so.
#[derive(Clone, Default)]
struct ManualReactor {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    armed: VecDeque<oneshot::Sender<Completion>>,
    arms: usize,
    cancels: usize,
    fail_arms: usize,
}

impl ManualReactor {
    fn arms(&self) -> usize {
        self.inner.lock().arms
    }

    fn armed(&self) -> usize {
        self.inner.lock().armed.len()
    }

    fn cancels(&self) -> usize {
        self.inner.lock().cancels
    }

    fn fail_next_arms(&self, count: usize) {
        self.inner.lock().fail_arms = count;
    }

    fn complete_next(&self, completion: Completion) {
        let tx = self
            .inner
            .lock()
            .armed
            .pop_front()
            .expect("no accept armed");
        let _ = tx.send(completion);
    }
}

impl Reactor for ManualReactor {
    fn register(&self, listener: StdTcpListener) -> io::Result<Box<dyn AcceptSource>> {
        Ok(Box::new(ManualSource {
            local_addr: listener.local_addr()?,
            _listener: listener,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn spawn(&self, task: Task) {
        tokio::spawn(task);
    }
}

struct ManualSource {
    local_addr: SocketAddr,
    _listener: StdTcpListener,
    inner: Arc<Mutex<ManualState>>,
}

impl AcceptSource for ManualSource {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn arm(&self) -> io::Result<AcceptFuture> {
        let mut state = self.inner.lock();
        state.arms += 1;
        if state.fail_arms > 0 {
            state.fail_arms -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "injected arm failure"));
        }
        let (tx, rx) = oneshot::channel();
        state.armed.push_back(tx);
        Ok(Box::pin(async move {
            rx.await.unwrap_or(Err(NotificationError::Closed))
        }))
    }

    fn cancel(&self) {
        self.inner.lock().cancels += 1;
    }
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.accept.rearm_base_delay_ms = 1;
    config.accept.rearm_max_delay_ms = 5;
    config
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// A connected pair: (server side, client side).
fn connected_pair() -> (StdTcpStream, StdTcpStream) {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let client = StdTcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server_side, _) = listener.accept().unwrap();
    (server_side, client)
}

fn aborted() -> Completion {
    Ok(AcceptOutcome::Failed(io::Error::new(
        io::ErrorKind::ConnectionAborted,
        "cancelled",
    )))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn server_with(
    reactor: &ManualReactor,
    config: ServerConfig,
) -> (Server, oneshot::Receiver<()>) {
    let (done_tx, done_rx) = oneshot::channel();
    let server = Server::builder(config)
        .reactor(Arc::new(reactor.clone()))
        .on_shutdown_complete(move || {
            let _ = done_tx.send(());
        })
        .build()
        .unwrap();
    (server, done_rx)
}

#[tokio::test]
async fn delivers_connection_and_rearms() {
    let reactor = ManualReactor::default();
    let (server, done_rx) = server_with(&reactor, test_config());
    let port = server.add_port(loopback()).unwrap();
    assert!(port > 0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.start(move |endpoint, acceptor| {
        let _ = tx.send((endpoint.peer_addr(), endpoint.peer().to_string(), acceptor));
    });
    assert_eq!(reactor.arms(), 1);
    assert_eq!(server.active_ports(), 1);

    let (server_side, client) = connected_pair();
    reactor.complete_next(Ok(AcceptOutcome::Connected(server_side)));

    let (peer_addr, peer, acceptor) = rx.recv().await.unwrap();
    let client_addr = client.local_addr().unwrap();
    assert_eq!(peer_addr, Some(client_addr));
    assert_eq!(peer, format!("ipv4:{}", client_addr));
    assert_eq!(acceptor.from_server, server.id());
    assert_eq!(acceptor.port_index, 0);

    wait_until(|| reactor.armed() == 1 && reactor.arms() == 2).await;
    assert_eq!(server.active_ports(), 1);

    server.release();
    assert_eq!(reactor.cancels(), 1);
    reactor.complete_next(aborted());
    tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reactor.arms(), 2);
}

#[tokio::test]
async fn connection_completed_during_shutdown_is_closed() {
    let reactor = ManualReactor::default();
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    let server = Server::builder(test_config())
        .reactor(Arc::new(reactor.clone()))
        .on_shutdown_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    server.add_port(loopback()).unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&delivered);
    server.start(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    server.release();
    assert_eq!(completions.load(Ordering::SeqCst), 0);

    let (server_side, mut client) = connected_pair();
    reactor.complete_next(Ok(AcceptOutcome::Connected(server_side)));
    wait_until(|| completions.load(Ordering::SeqCst) == 1).await;

    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap(), 0);

    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert_eq!(reactor.arms(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notification_failure_leaves_port_active() {
    let reactor = ManualReactor::default();
    let (server, mut done_rx) = server_with(&reactor, test_config());
    server.add_port(loopback()).unwrap();
    server.start(|_, _| panic!("nothing should be delivered"));

    reactor.complete_next(Err(NotificationError::Other("port closed".into())));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(reactor.arms(), 1);
    assert_eq!(server.active_ports(), 1);

    server.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server.is_shutdown_requested());
    assert_eq!(server.active_ports(), 1);
    assert!(done_rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_accept_is_rearmed() {
    let reactor = ManualReactor::default();
    let (server, _done_rx) = server_with(&reactor, test_config());
    server.add_port(loopback()).unwrap();
    server.start(|_, _| {});

    reactor.complete_next(Ok(AcceptOutcome::Failed(io::Error::new(
        io::ErrorKind::Other,
        "accept failed",
    ))));
    wait_until(|| reactor.arms() == 2 && reactor.armed() == 1).await;
    assert_eq!(server.active_ports(), 1);
}

#[tokio::test]
async fn arm_failure_is_retried() {
    let reactor = ManualReactor::default();
    let mut config = test_config();
    config.accept.max_rearm_attempts = 3;
    let (server, _done_rx) = server_with(&reactor, config);
    server.add_port(loopback()).unwrap();
    server.start(|_, _| {});

    reactor.fail_next_arms(2);
    let (server_side, _client) = connected_pair();
    reactor.complete_next(Ok(AcceptOutcome::Connected(server_side)));

    wait_until(|| reactor.armed() == 1).await;
    assert_eq!(reactor.arms(), 4);
    assert_eq!(server.active_ports(), 1);
}

#[tokio::test]
async fn exhausted_retries_stop_listener() {
    let reactor = ManualReactor::default();
    let mut config = test_config();
    config.accept.max_rearm_attempts = 2;
    let (server, done_rx) = server_with(&reactor, config);
    server.add_port(loopback()).unwrap();

    reactor.fail_next_arms(usize::MAX);
    server.start(|_, _| {});
    assert_eq!(server.active_ports(), 1);

    wait_until(|| server.active_ports() == 0).await;
    assert_eq!(reactor.arms(), 3);
    assert_eq!(reactor.armed(), 0);

    server.release();
    tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn ephemeral_port_is_shared_across_listeners() {
    let reactor = ManualReactor::default();
    let (server, _done_rx) = server_with(&reactor, test_config());
    let first = server.add_port(loopback()).unwrap();
    let second = server.add_port("127.0.0.2:0".parse().unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(server.ports(), vec![first, second]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.start(move |_, acceptor| {
        let _ = tx.send(acceptor.port_index);
    });
    assert_eq!(reactor.arms(), 2);
    assert_eq!(server.active_ports(), 2);

    let (server_side, _client) = connected_pair();
    reactor.complete_next(Ok(AcceptOutcome::Connected(server_side)));
    assert_eq!(rx.recv().await, Some(0));

    let (server_side, _client) = connected_pair();
    reactor.complete_next(Ok(AcceptOutcome::Connected(server_side)));
    assert_eq!(rx.recv().await, Some(1));
}

#[test]
fn concurrent_ephemeral_ports_agree() {
    let server = Server::builder(test_config())
        .reactor(Arc::new(ManualReactor::default()))
        .build()
        .unwrap();
    let hosts = ["127.0.0.1", "127.0.0.2", "127.0.0.3", "127.0.0.4"];
    let barrier = std::sync::Barrier::new(hosts.len());

    let ports: Vec<u16> = std::thread::scope(|scope| {
        let workers: Vec<_> = hosts
            .iter()
            .map(|host| {
                let server = &server;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    server
                        .add_port(format!("{}:0", host).parse().unwrap())
                        .unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert!(ports[0] > 0);
    assert!(ports.iter().all(|port| *port == ports[0]));
    assert_eq!(server.ports().len(), hosts.len());
}

#[test]
fn unstarted_server_completes_shutdown_on_release() {
    let reactor = ManualReactor::default();
    let events = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&events);
    let server = Server::builder(test_config())
        .reactor(Arc::new(reactor.clone()))
        .on_shutdown_complete(move || log.lock().push("complete"))
        .build()
        .unwrap();
    server.add_port(loopback()).unwrap();

    let log = Arc::clone(&events);
    server.notify_on_shutdown_starting(move || log.lock().push("starting-1"));
    let log = Arc::clone(&events);
    server.notify_on_shutdown_starting(move || log.lock().push("starting-2"));

    let second = server.acquire();
    assert_eq!(server.ref_count(), 2);
    server.release();
    assert!(events.lock().is_empty());

    second.release();
    assert_eq!(*events.lock(), vec!["starting-1", "starting-2", "complete"]);
    assert_eq!(reactor.arms(), 0);
}

#[test]
fn explicit_shutdown_completes_once() {
    let reactor = ManualReactor::default();
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    let server = Server::builder(test_config())
        .reactor(Arc::new(reactor))
        .on_shutdown_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    server.shutdown();
    server.shutdown();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert!(server.ports().is_empty());

    server.release();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[test]
fn bind_conflict_reports_target_and_code() {
    let taken = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let reactor = ManualReactor::default();
    let server = Server::builder(test_config())
        .reactor(Arc::new(reactor))
        .build()
        .unwrap();
    let err = server.add_port(addr).unwrap_err();
    assert!(err.target().ends_with(&format!(":{}", addr.port())));
    assert!(err.os_code().is_some());
    assert!(err.to_string().contains("failed to prepare server socket"));
    assert!(server.ports().is_empty());
}

#[test]
fn create_without_runtime_fails() {
    assert!(Server::create(ServerConfig::default(), None).is_err());
}

#[test]
#[should_panic(expected = "ports must be added before the server starts")]
fn add_port_after_start_panics() {
    let server = Server::builder(test_config())
        .reactor(Arc::new(ManualReactor::default()))
        .build()
        .unwrap();
    server.start(|_, _| {});
    let _ = server.add_port(loopback());
}

#[test]
#[should_panic(expected = "server already started")]
fn double_start_panics() {
    let server = Server::builder(test_config())
        .reactor(Arc::new(ManualReactor::default()))
        .build()
        .unwrap();
    server.start(|_, _| {});
    server.start(|_, _| {});
}
