//! A headless observer of the sample stream.
//!
//! Blocking client side of the wire protocol, used by the `sinecast-observer`
//! binary and the integration tests.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::net::{Endpoint, LineBuffer};
use crate::params::ControlMessage;
use crate::signal::Sample;

/// Points kept by a default [`SampleHistory`].
pub const DEFAULT_HISTORY: usize = 500;

const READ_CHUNK: usize = 4096;

/// Error receiving from or sending to the server.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
    /// No complete line arrived within the timeout.
    #[error("timed out waiting for a sample")]
    Timeout,
    /// A line was not a valid sample.
    #[error("malformed sample: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Connection to a running server.
#[derive(Debug)]
pub struct Observer {
    stream: TcpStream,
    lines: LineBuffer,
    read_buf: Box<[u8]>,
}

impl Observer {
    /// Connects to `endpoint`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Io`] if the connection cannot be established.
    pub fn connect(endpoint: Endpoint, timeout: Duration) -> Result<Self, ObserverError> {
        let stream = TcpStream::connect_timeout(&endpoint.as_socket_addr(), timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            lines: LineBuffer::new(),
            read_buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
        })
    }

    /// Local address of the connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn local_addr(&self) -> io::Result<Endpoint> {
        self.stream.local_addr().map(Endpoint::from)
    }

    /// Waits for the next sample.
    ///
    /// Blank lines are skipped. A line split across several reads is
    /// reassembled before decoding.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Closed`] on EOF, [`ObserverError::Timeout`]
    /// if no complete line arrives within `timeout`, and
    /// [`ObserverError::Malformed`] if the line does not decode.
    pub fn recv_sample(&mut self, timeout: Duration) -> Result<Sample, ObserverError> {
        let deadline = Instant::now() + timeout;

        loop {
            while let Some(line) = self.lines.next_line() {
                if !line.trim_ascii().is_empty() {
                    return Ok(Sample::decode_line(line)?);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ObserverError::Timeout);
            }
            self.stream.set_read_timeout(Some(remaining))?;

            match self.stream.read(&mut self.read_buf) {
                Ok(0) => return Err(ObserverError::Closed),
                Ok(n) => self.lines.extend(&self.read_buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(ObserverError::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    return Err(ObserverError::Closed);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sends a parameter update as one JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn send(&mut self, msg: &ControlMessage) -> Result<(), ObserverError> {
        let line = msg.to_line().map_err(io::Error::other)?;
        self.send_raw(&line)
    }

    /// Writes raw bytes, for clients that speak the protocol by hand.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ObserverError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    /// Closes both directions of the connection.
    pub fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Sliding window of the most recent `(time, value)` points.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    points: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }
}

impl SampleHistory {
    /// Creates a window holding at most `capacity` points (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest point when full.
    pub fn push(&mut self, sample: &Sample) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((sample.time, sample.value));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().copied()
    }

    /// Smallest and largest value in the window.
    #[must_use]
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut iter = self.points.iter().map(|&(_, v)| v);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Time covered from the oldest to the newest point.
    #[must_use]
    pub fn span(&self) -> Option<f64> {
        let (first, _) = self.points.front()?;
        let (last, _) = self.points.back()?;
        Some(last - first)
    }
}
