//! Sine wave broadcast server.
//!
//! Streams samples of a sine wave as JSON lines to every connected observer
//! and applies the parameter updates they send back.
//!
//! # Usage
//!
//! ```sh
//! sinecast-server --host 0.0.0.0 --port 5000 --rate-hz 100
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};

use sinecast::runtime::timing::period_from_rate;
use sinecast::{ControlError, ControlMessage, ParameterBounds, Server, ServerConfig, ServerError};
use sinecast::{WaveParameters, init_tracing};

/// How often the main thread checks for a shutdown request.
const WAIT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "sinecast-server", version, about = "Broadcast a live sine wave over TCP")]
struct Args {
    /// Host name or IPv4 address to bind.
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Listen backlog.
    #[arg(long, default_value_t = 5)]
    backlog: u32,

    /// Samples broadcast per second.
    #[arg(long, default_value_t = 100.0)]
    rate_hz: f64,

    /// Initial amplitude.
    #[arg(long, default_value_t = 1.0)]
    amplitude: f64,

    /// Initial frequency in Hz.
    #[arg(long, default_value_t = 1.0)]
    frequency: f64,

    /// Phase offset in radians.
    #[arg(long, default_value_t = 0.0)]
    phase: f64,

    /// Reject amplitude or frequency updates above this value.
    #[arg(long)]
    max_param: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid initial parameters: {0}")]
    Params(#[from] ControlError),
    #[error("invalid --rate-hz {0}: expected a finite positive rate with a nonzero period")]
    Rate(f64),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("failed to install signal handler: {0}")]
    Signal(io::Error),
}

fn main() {
    init_tracing();

    if let Err(e) = run(Args::parse()) {
        eprintln!("sinecast-server: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = config_from_args(&args)?;
    let server = Server::spawn(config)?;

    let shutdown_flag = server.shutdown_flag();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, shutdown_flag.clone()).map_err(CliError::Signal)?;
    }

    eprintln!("sinecast-server: listening on {}", server.local_addr());

    while !shutdown_flag.load(Ordering::Relaxed) {
        std::thread::sleep(WAIT_INTERVAL);
    }

    eprintln!("sinecast-server: shutting down...");
    server.shutdown();
    eprintln!("sinecast-server: stopped");

    Ok(())
}

fn config_from_args(args: &Args) -> Result<ServerConfig, CliError> {
    let bounds = ParameterBounds { max: args.max_param };
    ControlMessage {
        amplitude: Some(args.amplitude),
        frequency: Some(args.frequency),
    }
    .validate(&bounds)?;

    let tick_interval = period_from_rate(args.rate_hz).ok_or(CliError::Rate(args.rate_hz))?;

    Ok(ServerConfig {
        host: args.host.clone(),
        port: args.port,
        backlog: args.backlog,
        tick_interval,
        initial: WaveParameters::new(args.amplitude, args.frequency, args.phase),
        bounds,
        ..ServerConfig::default()
    })
}
