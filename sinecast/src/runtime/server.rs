//! Server runtime: a broadcast thread and a control thread around one listener.
//!
//! # Architecture
//!
//! [`Server::spawn`] binds the listening socket and starts two threads:
//! - **Broadcast thread**: samples the wave every tick and writes one JSON
//!   line to every registered client, pruning clients whose send fails.
//! - **Control thread**: accepts clients, polls them for control lines, and
//!   applies valid updates to the shared parameters.
//!
//! Both threads share the [`ParameterStore`], the [`ClientRegistry`], and a
//! shutdown flag. Neither ever blocks on a single client: all socket I/O is
//! non-blocking and a stalled client is dropped.
//!
//! # Wire Protocol
//!
//! ```text
//! server → client   {"time":<f64>,"value":<f64>,"amplitude":<f64>,"frequency":<f64>}\n
//! client → server   {"amplitude":<f64>,"frequency":<f64>}\n   (any subset)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sinecast::{Server, ServerConfig};
//!
//! let server = Server::spawn(ServerConfig::default())?;
//! println!("listening on {}", server.local_addr());
//!
//! // ... observers connect and stream ...
//!
//! server.shutdown();
//! # Ok::<(), sinecast::ServerError>(())
//! ```

mod broadcaster;
mod control_thread;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::net::{Endpoint, Listener};
use crate::params::{ParameterBounds, ParameterStore};
use crate::registry::ClientRegistry;
use crate::signal::WaveParameters;
use crate::trace::{debug, error, info};

pub use broadcaster::{BroadcastState, Broadcaster, StateCell, TickReport};
pub use control_thread::ControlThread;

/// Default host the server binds to.
pub const DEFAULT_HOST: &str = "localhost";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default tick period (100 Hz).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or IPv4 address to bind. Resolved to its first IPv4 address.
    pub host: String,
    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,
    /// Listen backlog.
    pub backlog: u32,
    /// Period between broadcast ticks.
    pub tick_interval: Duration,
    /// Upper bound on one control-thread poll wait. Also bounds shutdown latency.
    pub poll_timeout: Duration,
    /// Wave parameters at startup.
    pub initial: WaveParameters,
    /// Accepted range for parameter updates.
    pub bounds: ParameterBounds,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            backlog: 5,
            tick_interval: DEFAULT_TICK_INTERVAL,
            poll_timeout: Duration::from_millis(10),
            initial: WaveParameters::default(),
            bounds: ParameterBounds::default(),
        }
    }
}

/// Error starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured host has no IPv4 address.
    #[error("failed to resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },
    /// The listening socket could not be bound.
    #[error("failed to bind {endpoint}: {source}")]
    Bind { endpoint: Endpoint, source: io::Error },
    /// The poller could not be created.
    #[error("failed to create poller: {0}")]
    Poll(io::Error),
    /// A runtime thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(io::Error),
}

/// Handle to a running server.
///
/// Dropping the handle signals shutdown but does not wait for the threads.
/// Use [`Server::shutdown`] to stop and join them.
pub struct Server {
    local_addr: Endpoint,
    params: Arc<ParameterStore>,
    registry: Arc<ClientRegistry>,
    state: Arc<StateCell>,
    shutdown_flag: Arc<AtomicBool>,
    broadcast_handle: Option<JoinHandle<()>>,
    control_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds the listener and spawns the broadcast and control threads.
    ///
    /// # Errors
    ///
    /// See [`ServerError`]. No thread is left running on error.
    pub fn spawn(config: ServerConfig) -> Result<Self, ServerError> {
        info!(
            host = %config.host,
            port = config.port,
            tick_us = config.tick_interval.as_micros() as u64,
            "server starting"
        );

        let endpoint = Endpoint::resolve_v4(&config.host, config.port).map_err(|source| {
            error!(host = %config.host, error = %source, "failed to resolve host");
            ServerError::Resolve {
                host: config.host.clone(),
                source,
            }
        })?;

        let listener = Listener::bind(endpoint, config.backlog).map_err(|source| {
            error!(endpoint = %endpoint, error = %source, "failed to bind listener");
            ServerError::Bind { endpoint, source }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { endpoint, source })?;

        let params = Arc::new(ParameterStore::new(config.initial));
        let registry = Arc::new(ClientRegistry::new());
        let state = Arc::new(StateCell::default());
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let control = ControlThread::new(
            listener,
            Arc::clone(&registry),
            Arc::clone(&params),
            config.bounds,
            config.poll_timeout,
            Arc::clone(&shutdown_flag),
        )
        .map_err(ServerError::Poll)?;

        let mut broadcaster =
            Broadcaster::new(Arc::clone(&params), Arc::clone(&registry), Arc::clone(&state));
        let tick_interval = config.tick_interval;
        let broadcast_flag = Arc::clone(&shutdown_flag);

        debug!("spawning broadcast thread");
        let broadcast_handle = thread::Builder::new()
            .name("sinecast-broadcast".into())
            .spawn(move || {
                info!("broadcast thread started");
                broadcaster.run(tick_interval, &broadcast_flag);
                info!("broadcast thread exiting");
            })
            .map_err(ServerError::Spawn)?;

        debug!("spawning control thread");
        let control_handle = match thread::Builder::new()
            .name("sinecast-control".into())
            .spawn(move || {
                info!("control thread started");
                control.run();
                info!("control thread exiting");
            }) {
            Ok(handle) => handle,
            Err(e) => {
                shutdown_flag.store(true, Ordering::Relaxed);
                let _ = broadcast_handle.join();
                return Err(ServerError::Spawn(e));
            }
        };

        info!(addr = %local_addr, "server listening");

        Ok(Self {
            local_addr,
            params,
            registry,
            state,
            shutdown_flag,
            broadcast_handle: Some(broadcast_handle),
            control_handle: Some(control_handle),
        })
    }

    /// Address the listener is bound to (with the real port if 0 was requested).
    #[must_use]
    pub const fn local_addr(&self) -> Endpoint {
        self.local_addr
    }

    /// Current wave parameters.
    #[must_use]
    pub fn parameters(&self) -> WaveParameters {
        self.params.get()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn broadcast_state(&self) -> BroadcastState {
        self.state.get()
    }

    /// Returns true once shutdown was requested from any source, including a
    /// fatal control-thread error.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Stops both threads and waits for them.
    ///
    /// The broadcaster is joined first so no sample is written while the
    /// control thread closes the clients and then the listener.
    pub fn shutdown(mut self) {
        info!("server shutdown initiated");
        self.shutdown_flag.store(true, Ordering::Relaxed);

        if let Some(handle) = self.broadcast_handle.take() {
            debug!("waiting for broadcast thread to exit");
            let _ = handle.join();
        }

        if let Some(handle) = self.control_handle.take() {
            debug!("waiting for control thread to exit");
            let _ = handle.join();
        }

        info!("server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }
}
