//! Transport endpoint handed to the connection callback.
//!
//! The engine's involvement ends once an endpoint is built: the connected
//! socket, its peer name and a buffer allocator move into the endpoint and
//! the callback owns all of it.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream as StdTcpStream};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Hands out read buffers of a fixed size.
#[derive(Debug, Clone)]
pub struct BufferAllocator {
    chunk_size: usize,
}

impl BufferAllocator {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn allocate(&self) -> Vec<u8> {
        vec![0; self.chunk_size]
    }
}

/// An accepted connection, registered with the tokio runtime.
pub struct TcpEndpoint {
    stream: TcpStream,
    name: String,
    peer: String,
    peer_addr: Option<SocketAddr>,
    allocator: BufferAllocator,
}

impl TcpEndpoint {
    /// Build an endpoint from an owned connected socket.
    ///
    /// `peer` is the URI form of the peer address, empty when it could not be
    /// determined. Fails when called outside a tokio runtime.
    pub fn new(
        stream: StdTcpStream,
        peer_addr: Option<SocketAddr>,
        peer: String,
        allocator: BufferAllocator,
    ) -> io::Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "no tokio runtime to register the connection with",
            ));
        }
        stream.set_nonblocking(true)?;
        let stream = TcpStream::from_std(stream)?;
        Ok(Self {
            stream,
            name: format!("tcp_server:{}", peer),
            peer,
            peer_addr,
            allocator,
        })
    }

    /// Identifier used in logs, e.g. `tcp_server:ipv4:127.0.0.1:50412`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Peer address in URI form; empty when unknown.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Peer socket address, with IPv4-mapped addresses reported as IPv4.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn allocator(&self) -> &BufferAllocator {
        &self.allocator
    }

    /// Read the next chunk of bytes. `Ok(None)` means the peer closed.
    pub async fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = self.allocator.allocate();
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

impl fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("name", &self.name)
            .field("peer_addr", &self.peer_addr)
            .field("chunk_size", &self.allocator.chunk_size())
            .finish()
    }
}
