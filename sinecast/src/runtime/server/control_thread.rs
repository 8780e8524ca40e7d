//! Control thread runtime.
//!
//! Responsibilities:
//! - Own the listening socket and accept observers into the registry.
//! - Poll every registered connection for inbound control lines.
//! - Reassemble lines per connection and apply valid updates to the
//!   parameter store; discard invalid ones without dropping the client.
//! - Unregister clients on orderly close or read failure, and reap clients
//!   the broadcaster pruned.
//! - On shutdown, close every client before releasing the listener.

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::net::TcpStream;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::net::{Connection, ConnectionId, Endpoint, LineBuffer, Listener};
use crate::params::{ControlMessage, ParameterBounds, ParameterStore};
use crate::registry::ClientRegistry;
use crate::trace::{debug, error, info, warn};

/// Poll token of the listening socket. Connection ids start at 1.
const LISTENER: Token = Token(0);

/// Maximum readiness events handled per poll.
const EVENT_CAPACITY: usize = 256;

/// Bytes read from a socket per `read` call.
const READ_CHUNK: usize = 4096;

/// Bytes read from one client per service call before yielding to the others.
const READ_BUDGET: usize = 16 * READ_CHUNK;

/// Per-client state owned by the control thread.
struct Session {
    conn: Arc<Connection>,
    lines: LineBuffer,
}

/// Result of draining a readable socket.
enum ReadStatus {
    /// Drained to `WouldBlock`; the connection stays.
    Open,
    /// Read budget spent with data possibly left in the socket.
    Pending,
    /// Peer closed its end.
    Closed,
    /// Read error; treated like a close.
    Failed(io::Error),
}

/// Control thread state and event loop.
pub struct ControlThread {
    poll: Poll,
    events: Events,
    /// Tokens from the last poll, copied out so handlers can borrow `self`.
    ready: Vec<Token>,
    /// Clients that hit the read budget. Readiness is edge-triggered, so they
    /// are serviced again without waiting for a new event.
    backlog: Vec<ConnectionId>,
    listener: Listener,
    registry: Arc<ClientRegistry>,
    params: Arc<ParameterStore>,
    bounds: ParameterBounds,
    sessions: HashMap<ConnectionId, Session>,
    poll_timeout: Duration,
    /// Shutdown flag shared with the server handle.
    shutdown_flag: Arc<AtomicBool>,
    read_buf: Vec<u8>,
}

impl ControlThread {
    /// Creates the control thread state and registers the listener with a new poller.
    ///
    /// # Errors
    ///
    /// Returns an error if the poller cannot be created or the listener
    /// cannot be registered with it.
    pub fn new(
        mut listener: Listener,
        registry: Arc<ClientRegistry>,
        params: Arc<ParameterStore>,
        bounds: ParameterBounds,
        poll_timeout: Duration,
        shutdown_flag: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            ready: Vec::with_capacity(EVENT_CAPACITY),
            backlog: Vec::new(),
            listener,
            registry,
            params,
            bounds,
            sessions: HashMap::new(),
            poll_timeout,
            shutdown_flag,
            read_buf: vec![0u8; READ_CHUNK],
        })
    }

    /// Runs the accept/poll loop until the shutdown flag is set.
    ///
    /// A poller failure is unrecoverable: it sets the shutdown flag so the
    /// broadcaster stops as well.
    pub fn run(mut self) {
        while !self.shutdown_flag.load(Ordering::Relaxed) {
            if let Err(_e) = self.cycle() {
                error!(error = %_e, "poll failed, shutting down");
                self.shutdown_flag.store(true, Ordering::Relaxed);
            }
        }

        self.do_shutdown();
    }

    /// One iteration: accept, reap, poll, then service ready sockets.
    fn cycle(&mut self) -> io::Result<()> {
        self.accept_pending();
        self.reap_pruned();

        let timeout = if self.backlog.is_empty() {
            self.poll_timeout
        } else {
            Duration::ZERO
        };
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        self.ready.clear();
        self.ready.extend(self.events.iter().map(|event| event.token()));

        let mut carried = std::mem::take(&mut self.backlog);
        for i in 0..self.ready.len() {
            let token = self.ready[i];
            if token == LISTENER {
                self.accept_pending();
            } else if let Some(id) = id_for(token) {
                carried.retain(|&c| c != id);
                self.service(id);
            }
        }
        for id in carried {
            self.service(id);
        }
        Ok(())
    }

    /// Accepts connections until the accept queue is empty.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.try_accept() {
                Ok(Some((stream, peer))) => self.admit(stream, peer),
                Ok(None) => return,
                Err(_e) => {
                    warn!(error = %_e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Registers a new client with the registry and the poller.
    fn admit(&mut self, stream: TcpStream, peer: Endpoint) {
        let conn = self.registry.register(stream, peer);
        let id = conn.id();
        let registered = token_for(id)
            .ok_or_else(|| io::Error::other("connection id exceeds poll token range"))
            .and_then(|token| {
                let fd = conn.as_raw_fd();
                self.poll
                    .registry()
                    .register(&mut SourceFd(&fd), token, Interest::READABLE)
            });
        if let Err(_e) = registered {
            warn!(client = %id, peer = %peer, error = %_e, "failed to poll client, dropping");
            self.registry.unregister(id);
            conn.close();
            return;
        }

        info!(client = %id, peer = %peer, clients = self.registry.len(), "client connected");
        self.sessions.insert(
            id,
            Session {
                conn,
                lines: LineBuffer::new(),
            },
        );
    }

    /// Reads everything available from one client and applies complete lines.
    fn service(&mut self, id: ConnectionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        let status = drain_socket(&session.conn, &mut session.lines, &mut self.read_buf);

        while let Some(line) = session.lines.next_line() {
            apply_line(id, line, &self.params, &self.bounds);
        }
        let _discarded = session.lines.take_discarded();
        if _discarded > 0 {
            warn!(client = %id, bytes = _discarded, "discarding oversized control line");
        }

        match status {
            ReadStatus::Open => {}
            ReadStatus::Pending => self.backlog.push(id),
            ReadStatus::Closed => {
                debug!(client = %id, "peer closed connection");
                self.drop_session(id);
            }
            ReadStatus::Failed(_e) => {
                debug!(client = %id, error = %_e, "read failed");
                self.drop_session(id);
            }
        }
    }

    /// Drops sessions whose connection the broadcaster already unregistered.
    fn reap_pruned(&mut self) {
        // Only this thread registers, so the registry can only lag behind.
        if self.registry.len() == self.sessions.len() {
            return;
        }

        let live: HashSet<ConnectionId> =
            self.registry.snapshot().iter().map(|c| c.id()).collect();
        let stale: Vec<ConnectionId> = self
            .sessions
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();

        for id in stale {
            self.drop_session(id);
        }
    }

    /// Removes a client everywhere. Safe to call for already-pruned clients.
    fn drop_session(&mut self, id: ConnectionId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };

        let fd = session.conn.as_raw_fd();
        let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
        self.registry.unregister(id);
        session.conn.close();

        info!(
            client = %id,
            peer = %session.conn.peer(),
            clients = self.registry.len(),
            "client disconnected"
        );
    }

    /// Closes every client, then the listener.
    fn do_shutdown(mut self) {
        info!(clients = self.registry.len(), "closing client connections");

        let ids: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.drop_session(id);
        }
        for conn in self.registry.drain() {
            conn.close();
        }

        let _ = self.poll.registry().deregister(&mut self.listener);
        drop(self.listener);
        info!("listener closed");
    }
}

/// Reads until `WouldBlock`, EOF, error, or [`READ_BUDGET`] bytes, feeding `lines`.
fn drain_socket(conn: &Connection, lines: &mut LineBuffer, buf: &mut [u8]) -> ReadStatus {
    let mut total = 0;
    while total < READ_BUDGET {
        match conn.try_read(buf) {
            Ok(None) => return ReadStatus::Open,
            Ok(Some(0)) => return ReadStatus::Closed,
            Ok(Some(n)) => {
                lines.extend(&buf[..n]);
                total += n;
            }
            Err(e) => return ReadStatus::Failed(e),
        }
    }
    ReadStatus::Pending
}

/// Poll token of a client. Ids start at 1, so no client maps to [`LISTENER`].
fn token_for(id: ConnectionId) -> Option<Token> {
    usize::try_from(id.get()).ok().map(Token)
}

fn id_for(token: Token) -> Option<ConnectionId> {
    u64::try_from(token.0).ok().map(ConnectionId::new)
}

/// Parses one control line and applies it, logging and discarding invalid input.
fn apply_line(_client: ConnectionId, line: &[u8], params: &ParameterStore, bounds: &ParameterBounds) {
    if line.trim_ascii().is_empty() {
        return;
    }

    match ControlMessage::parse_line(line, bounds) {
        Ok(msg) => {
            let _updated = params.apply(&msg);
            info!(
                client = %_client,
                amplitude = _updated.amplitude,
                frequency = _updated.frequency,
                "parameters updated"
            );
        }
        Err(_e) => {
            warn!(client = %_client, error = %_e, "discarding control message");
        }
    }
}
