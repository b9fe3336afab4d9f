//! Listening and accepted socket preparation.
//!
//! # Responsibilities
//! - Create a stream socket for a normalized address (dual-stack for IPv6)
//! - Apply generic per-socket options, bind, listen, read back the bound port
//! - Apply connection options to accepted sockets
//!
//! Every failure while building a listening socket is reported as one
//! [`PrepareSocketError`]; the half-built socket is closed before returning.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, TcpKeepalive, Type};

use crate::config::SocketConfig;
use crate::error::{PrepareSocketError, SocketOp};
use crate::net::addr;

/// Backlog requested when none is configured; the kernel clamps it to its maximum.
pub const OS_MAX_BACKLOG: i32 = i32::MAX;

/// A bound, listening socket and the concrete address the OS assigned.
#[derive(Debug)]
pub struct BoundListener {
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
}

impl BoundListener {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

/// Bind a listening socket, retrying with plain IPv4 when dual-stack IPv6 is unavailable.
///
/// `ephemeral` marks a port the caller asked the OS (or a sibling listener)
/// to pick. Such sockets always get SO_REUSEPORT so the listeners of one
/// server can share the port; sockets on an explicit port only get it when
/// `config.reuse_port` is set, so a busy port fails to bind.
pub fn bind_listener(
    target: SocketAddr,
    config: &SocketConfig,
    ephemeral: bool,
) -> Result<BoundListener, PrepareSocketError> {
    match prepare_listener(target, config, ephemeral) {
        Ok(bound) => Ok(bound),
        Err(err) if err.ipv6_unavailable() => match addr::ipv4_fallback(&target) {
            Some(v4) => {
                tracing::debug!(
                    address = %err.target,
                    fallback = %addr::to_uri(&v4),
                    error = %err,
                    "Dual-stack socket unavailable, binding IPv4 only"
                );
                prepare_listener(v4, config, ephemeral)
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// Create, bind and listen on `target` without any fallback.
pub fn prepare_listener(
    target: SocketAddr,
    config: &SocketConfig,
    ephemeral: bool,
) -> Result<BoundListener, PrepareSocketError> {
    let uri = addr::to_uri(&target);
    let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))
        .map_err(|source| PrepareSocketError {
            target: uri.clone(),
            fd: None,
            op: SocketOp::Socket,
            source,
        })?;

    // On error `socket` is dropped (closed) when this function returns.
    let fail = |socket: &Socket, op: SocketOp, source: io::Error| PrepareSocketError {
        target: uri.clone(),
        fd: raw_handle(socket),
        op,
        source,
    };

    let reuse_port = config.reuse_port || ephemeral;
    prepare_socket(&socket, &target, reuse_port).map_err(|e| fail(&socket, SocketOp::SetSockOpt, e))?;
    socket
        .bind(&SockAddr::from(target))
        .map_err(|e| fail(&socket, SocketOp::Bind, e))?;
    socket
        .listen(config.listen_backlog.unwrap_or(OS_MAX_BACKLOG))
        .map_err(|e| fail(&socket, SocketOp::Listen, e))?;

    let local_addr = socket
        .local_addr()
        .and_then(|sa| {
            sa.as_socket().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "bound address is not an inet address")
            })
        })
        .map_err(|e| fail(&socket, SocketOp::GetSockName, e))?;

    Ok(BoundListener {
        listener: TcpListener::from(socket),
        local_addr,
    })
}

/// Generic options applied to every listening socket before bind.
fn prepare_socket(socket: &Socket, target: &SocketAddr, reuse_port: bool) -> io::Result<()> {
    socket.set_nonblocking(true)?;
    if target.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    if reuse_port {
        set_reuse_port(socket)?;
    }
    Ok(())
}

#[cfg(all(
    unix,
    not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
))]
fn set_reuse_port(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_port(true)
}

#[cfg(not(all(
    unix,
    not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
)))]
fn set_reuse_port(_socket: &Socket) -> io::Result<()> {
    Ok(())
}

/// Options applied to a freshly accepted connection.
pub fn prepare_accepted(stream: &TcpStream, config: &SocketConfig) -> io::Result<()> {
    stream.set_nodelay(config.nodelay)?;
    if let Some(secs) = config.keepalive_secs {
        let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(secs));
        SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    }
    Ok(())
}

#[cfg(unix)]
fn raw_handle(socket: &Socket) -> Option<i64> {
    use std::os::unix::io::AsRawFd;
    Some(i64::from(socket.as_raw_fd()))
}

#[cfg(windows)]
fn raw_handle(socket: &Socket) -> Option<i64> {
    use std::os::windows::io::AsRawSocket;
    i64::try_from(socket.as_raw_socket()).ok()
}

#[cfg(not(any(unix, windows)))]
fn raw_handle(_socket: &Socket) -> Option<i64> {
    None
}
