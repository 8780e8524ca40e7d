//! Server runtime.
//!
//! - `timing`: tick scheduling and wall-clock timestamps.
//! - `server`: the [`Server`](server::Server) handle plus its broadcaster and
//!   control threads.

pub mod server;
pub mod timing;
