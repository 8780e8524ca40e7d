//! Logging for the server and observer.
//!
//! Log calls go through the crate-internal `debug!`, `info!`, `warn!`,
//! `error!` and `trace!` macros. With the default `tracing` feature they are
//! the `tracing` macros; without it they discard their arguments.

/// Installs a global fmt subscriber filtered by `RUST_LOG`, or `sinecast=info`
/// when it is unset.
///
/// Lines carry the uptime and the emitting thread's name. Safe to call more
/// than once: only the first call installs anything.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    const DEFAULT_FILTER: &str = "sinecast=info";

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let layer = fmt::layer()
        .with_timer(fmt::time::uptime())
        .with_thread_names(true)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use discard as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as warn;
