//! Headless observer for a sinecast server.
//!
//! Prints every received sample as `time value`, optionally after sending
//! one parameter update.
//!
//! # Usage
//!
//! ```sh
//! sinecast-observer --host 127.0.0.1 --port 5000 --frequency 2.5 --count 100
//! ```

use std::time::Duration;

use clap::Parser;

use sinecast::net::Endpoint;
use sinecast::observer::{Observer, ObserverError, SampleHistory};
use sinecast::ControlMessage;

#[derive(Debug, Parser)]
#[command(name = "sinecast-observer", version, about = "Print a live sine wave stream")]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Amplitude to request before streaming.
    #[arg(long)]
    amplitude: Option<f64>,

    /// Frequency to request before streaming.
    #[arg(long)]
    frequency: Option<f64>,

    /// Stop after this many samples. Streams until the server closes if unset.
    #[arg(long)]
    count: Option<u64>,

    /// Seconds to wait for each sample.
    #[arg(long, default_value_t = 5.0)]
    timeout_secs: f64,
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        eprintln!("sinecast-observer: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), ObserverError> {
    let endpoint = Endpoint::resolve_v4(&args.host, args.port)?;
    let timeout = Duration::try_from_secs_f64(args.timeout_secs).unwrap_or(Duration::from_secs(5));
    let mut observer = Observer::connect(endpoint, timeout)?;

    let update = ControlMessage {
        amplitude: args.amplitude,
        frequency: args.frequency,
    };
    if !update.is_empty() {
        observer.send(&update)?;
    }

    let mut history = SampleHistory::default();
    let mut received = 0u64;
    while args.count.is_none_or(|count| received < count) {
        let sample = match observer.recv_sample(timeout) {
            Ok(sample) => sample,
            Err(ObserverError::Closed) => break,
            Err(e) => return Err(e),
        };
        println!("{} {}", sample.time, sample.value);
        history.push(&sample);
        received += 1;
    }

    if let Some((lo, hi)) = history.value_range() {
        eprintln!(
            "sinecast-observer: {received} samples, last {} spanning {:.3}s in [{lo:.3}, {hi:.3}]",
            history.len(),
            history.span().unwrap_or(0.0),
        );
    }
    Ok(())
}
