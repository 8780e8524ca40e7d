//! Non-blocking TCP listener.
//!
//! The socket is created through rustix so `SO_REUSEADDR` and the listen
//! backlog are set explicitly before it is handed to mio for polling.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd};

use mio::event::Source;
use mio::net::{TcpListener as MioTcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use rustix::net::{AddressFamily, SocketFlags, SocketType, sockopt};

use super::Endpoint;

/// A listening IPv4 TCP socket in non-blocking mode.
pub struct Listener {
    inner: MioTcpListener,
}

impl Listener {
    /// Binds and listens on `endpoint` with `SO_REUSEADDR` set.
    ///
    /// `backlog` is clamped to at least 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not IPv4 or if the socket cannot
    /// be created, bound, or put into listening state.
    pub fn bind(endpoint: Endpoint, backlog: u32) -> io::Result<Self> {
        let SocketAddr::V4(addr) = endpoint.as_socket_addr() else {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "listener requires an IPv4 endpoint",
            ));
        };

        let fd = rustix::net::socket_with(
            AddressFamily::INET,
            SocketType::STREAM,
            SocketFlags::CLOEXEC | SocketFlags::NONBLOCK,
            None,
        )?;
        sockopt::set_socket_reuseaddr(&fd, true)?;
        rustix::net::bind(&fd, &addr)?;
        let backlog = i32::try_from(backlog.max(1)).unwrap_or(i32::MAX);
        rustix::net::listen(&fd, backlog)?;

        let std_listener = std::net::TcpListener::from(fd);
        Ok(Self {
            inner: MioTcpListener::from_std(std_listener),
        })
    }

    /// Returns the local address this listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr().map(Endpoint::from)
    }

    /// Accepts one pending connection, returning `Ok(None)` instead of
    /// `WouldBlock` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns an error on accept failure.
    pub fn try_accept(&self) -> io::Result<Option<(TcpStream, Endpoint)>> {
        match self.inner.accept() {
            Ok((stream, addr)) => Ok(Some((stream, Endpoint::from(addr)))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns whether `SO_REUSEADDR` is set on the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be read.
    pub fn reuse_address(&self) -> io::Result<bool> {
        Ok(sockopt::socket_reuseaddr(self.inner.as_fd())?)
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Source for Listener {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream as StdTcpStream;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn bind_ephemeral_and_local_addr() {
        let listener = Listener::bind(Endpoint::localhost(0), 5).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn reuse_address_is_set() {
        let listener = Listener::bind(Endpoint::localhost(0), 5).unwrap();
        assert!(listener.reuse_address().unwrap());
    }

    #[test]
    fn try_accept_empty() {
        let listener = Listener::bind(Endpoint::localhost(0), 5).unwrap();
        assert!(listener.try_accept().unwrap().is_none());
    }

    #[test]
    fn try_accept_pending_connection() {
        let listener = Listener::bind(Endpoint::localhost(0), 5).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr.as_socket_addr()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let accepted = loop {
            if let Some(accepted) = listener.try_accept().unwrap() {
                break accepted;
            }
            assert!(Instant::now() < deadline, "connection never became acceptable");
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(accepted.1, Endpoint::from(client.local_addr().unwrap()));
    }

    #[test]
    fn bind_conflict_fails() {
        let first = Listener::bind(Endpoint::localhost(0), 5).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = Listener::bind(Endpoint::localhost(port), 5).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AddrInUse);
    }

    #[test]
    fn ipv6_endpoint_rejected() {
        let ep = Endpoint::from(std::net::SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, 0)));
        let err = Listener::bind(ep, 5).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
