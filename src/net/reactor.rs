//! Completion backends for the accept cycle.
//!
//! The server never touches a runtime directly. It registers each listening
//! socket with a [`Reactor`], which hands back an [`AcceptSource`]: the
//! per-listener capability used to arm accepts. Each armed accept is an
//! [`AcceptFuture`] that resolves exactly once; the reactor runs the task
//! that awaits it.
//!
//! [`TokioReactor`] is the production backend.

use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::NotificationError;

/// A task handed to [`Reactor::spawn`].
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One armed accept. Resolves exactly once.
pub type AcceptFuture =
    Pin<Box<dyn Future<Output = Result<AcceptOutcome, NotificationError>> + Send + 'static>>;

/// What the OS reported for one armed accept.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// A peer connected; the socket is owned by whoever holds this value.
    Connected(StdTcpStream),
    /// The accept failed, or was cancelled by a listener shutdown.
    Failed(io::Error),
}

/// Runtime that owns socket registration and completion delivery.
pub trait Reactor: Send + Sync + 'static {
    /// Take ownership of a bound, listening socket.
    fn register(&self, listener: StdTcpListener) -> io::Result<Box<dyn AcceptSource>>;

    /// Run `task` to completion in the background. Must not run it inline.
    fn spawn(&self, task: Task);
}

/// A listening socket registered with a reactor.
///
/// Dropping the source closes the socket.
pub trait AcceptSource: Send + Sync + 'static {
    /// Address the OS reports for the socket.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Submit the next accept.
    fn arm(&self) -> io::Result<AcceptFuture>;

    /// Cancel outstanding and future accepts. Irreversible.
    ///
    /// Every armed accept still resolves, as `Failed` or with a connection
    /// that completed before the cancellation took effect.
    fn cancel(&self);
}

/// Reactor backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioReactor {
    handle: Handle,
}

impl TokioReactor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Reactor for TokioReactor {
    fn register(&self, listener: StdTcpListener) -> io::Result<Box<dyn AcceptSource>> {
        let _guard = self.handle.enter();
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        let (cancel, _) = watch::channel(false);
        Ok(Box::new(TokioAcceptSource {
            listener: Arc::new(listener),
            cancel,
        }))
    }

    fn spawn(&self, task: Task) {
        self.handle.spawn(task);
    }
}

struct TokioAcceptSource {
    listener: Arc<TcpListener>,
    cancel: watch::Sender<bool>,
}

impl AcceptSource for TokioAcceptSource {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn arm(&self) -> io::Result<AcceptFuture> {
        let listener = Arc::clone(&self.listener);
        let cancelled = self.cancel.subscribe();
        Ok(Box::pin(async move {
            tokio::select! {
                biased;
                res = wait_cancelled(cancelled) => match res {
                    Ok(()) => Ok(AcceptOutcome::Failed(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "accept cancelled by listener shutdown",
                    ))),
                    Err(err) => Err(err),
                },
                res = listener.accept() => Ok(
                    match res.and_then(|(stream, _)| stream.into_std()) {
                        Ok(stream) => AcceptOutcome::Connected(stream),
                        Err(err) => AcceptOutcome::Failed(err),
                    },
                ),
            }
        }))
    }

    fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

/// Resolves once the cancel flag is set; errors if the source was dropped first.
async fn wait_cancelled(mut cancelled: watch::Receiver<bool>) -> Result<(), NotificationError> {
    cancelled
        .wait_for(|cancelled| *cancelled)
        .await
        .map_err(|_| NotificationError::Closed)?;
    Ok(())
}
