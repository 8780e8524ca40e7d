//! An accepted observer connection.
//!
//! Reads and writes go through `&TcpStream`, so the broadcaster can send on
//! a connection while the control thread reads from it.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, RawFd};

use mio::net::TcpStream;

use super::Endpoint;

/// Registry-assigned identifier of a connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A non-blocking stream to one observer.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: Endpoint,
    stream: TcpStream,
}

impl Connection {
    /// Wraps an accepted non-blocking stream.
    #[must_use]
    pub const fn new(id: ConnectionId, stream: TcpStream, peer: Endpoint) -> Self {
        Self { id, peer, stream }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the remote observer.
    #[must_use]
    pub const fn peer(&self) -> Endpoint {
        self.peer
    }

    /// Writes a whole line without blocking.
    ///
    /// A full socket buffer is reported as `WouldBlock`, even after partial
    /// progress: the stream is then desynchronized and the caller should
    /// drop the connection.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` if the kernel buffer is full, `WriteZero` if the
    /// socket accepts no bytes, or the underlying I/O error.
    pub fn send_line(&self, line: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < line.len() {
            match (&self.stream).write(&line[written..]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads available bytes, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// `Ok(Some(0))` means the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match (&self.stream).read(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Shuts down both directions so the peer observes EOF.
    ///
    /// The descriptor itself is released when the last handle is dropped.
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
