//! Real-time sine wave distribution over TCP.
//!
//! A [`Server`] samples a parametrized sine wave at a fixed rate and streams
//! every sample as a JSON line to all connected observers. Observers may send
//! partial parameter updates back, which apply to every observer on the next
//! tick.
//!
//! - [`signal`]: the pure generator and the sample record.
//! - [`params`]: shared wave parameters and control message parsing.
//! - [`registry`]: the set of live observer connections.
//! - [`runtime`]: the broadcaster and control threads behind [`Server`].
//! - [`observer`]: a headless client of the wire protocol.

pub mod net;
pub mod observer;
pub mod params;
pub mod registry;
pub mod runtime;
pub mod signal;
mod trace;

pub use params::{ControlError, ControlMessage, ParameterBounds, ParameterStore};
pub use registry::ClientRegistry;
pub use runtime::server::{BroadcastState, Server, ServerConfig, ServerError};
pub use signal::{Sample, WaveParameters};
pub use trace::init_tracing;
