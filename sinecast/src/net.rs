//! TCP transport primitives.
//!
//! Thin non-blocking wrappers over mio sockets: a listener with explicit
//! socket options, observer connections that can be written from one thread
//! while being read from another, and newline framing.

pub mod connection;
pub mod endpoint;
pub mod line;
pub mod listener;

pub use connection::{Connection, ConnectionId};
pub use endpoint::Endpoint;
pub use line::LineBuffer;
pub use listener::Listener;
