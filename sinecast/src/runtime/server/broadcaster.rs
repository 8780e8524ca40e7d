//! Broadcast thread runtime.
//!
//! Responsibilities:
//! - Sample the wave once per tick from a parameter snapshot.
//! - Encode the sample once and send the same line to every registered client.
//! - Collect failed sends during the pass and prune them after it, so one
//!   broken client never aborts delivery to the others.
//! - Keep a fixed tick period without catch-up bursts after an overrun.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use minstant::Instant;

use crate::net::ConnectionId;
use crate::params::ParameterStore;
use crate::registry::ClientRegistry;
use crate::runtime::timing::{TickSchedule, WallClock};
use crate::trace::{debug, info, trace, warn};

/// Lifecycle of the broadcast loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BroadcastState {
    /// Created, loop not started.
    Idle = 0,
    /// Ticking.
    Running = 1,
    /// Loop exited after a shutdown request.
    Stopped = 2,
}

/// Atomically shared [`BroadcastState`].
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    #[must_use]
    pub fn get(&self) -> BroadcastState {
        match self.0.load(Ordering::Acquire) {
            0 => BroadcastState::Idle,
            1 => BroadcastState::Running,
            _ => BroadcastState::Stopped,
        }
    }

    fn set(&self, state: BroadcastState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Clients that received the sample line.
    pub delivered: usize,
    /// Clients removed from the registry because their send failed.
    pub pruned: usize,
}

/// Broadcast loop state.
pub struct Broadcaster {
    params: Arc<ParameterStore>,
    registry: Arc<ClientRegistry>,
    state: Arc<StateCell>,
    clock: WallClock,
    /// Reusable encode buffer for the sample line.
    line: Vec<u8>,
    /// Clients whose send failed during the current tick.
    failed: Vec<ConnectionId>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(
        params: Arc<ParameterStore>,
        registry: Arc<ClientRegistry>,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            params,
            registry,
            state,
            clock: WallClock::new(),
            line: Vec::with_capacity(128),
            failed: Vec::new(),
        }
    }

    /// Runs ticks every `period` until `shutdown` is set.
    pub fn run(&mut self, period: Duration, shutdown: &AtomicBool) {
        self.state.set(BroadcastState::Running);
        let mut schedule = TickSchedule::starting_at(Instant::now(), period);

        while !shutdown.load(Ordering::Relaxed) {
            self.tick();

            let sleep = schedule.advance(Instant::now());
            if sleep.is_zero() {
                trace!(period_us = period.as_micros() as u64, "tick overrun");
            } else {
                thread::sleep(sleep);
            }
        }

        self.state.set(BroadcastState::Stopped);
    }

    /// Samples at the current wall-clock time and sends to every client.
    pub fn tick(&mut self) -> TickReport {
        let t = self.clock.now_secs();
        self.tick_at(t)
    }

    /// Samples at time `t` and sends to every client.
    pub fn tick_at(&mut self, t: f64) -> TickReport {
        let sample = self.params.get().sample_at(t);
        if let Err(_e) = sample.encode_line(&mut self.line) {
            warn!(error = %_e, "failed to encode sample, skipping tick");
            return TickReport::default();
        }

        self.failed.clear();
        let mut delivered = 0;
        for conn in self.registry.snapshot() {
            match conn.send_line(&self.line) {
                Ok(()) => delivered += 1,
                Err(_e) => {
                    debug!(client = %conn.id(), peer = %conn.peer(), error = %_e, "send failed");
                    self.failed.push(conn.id());
                }
            }
        }

        let pruned = self.registry.unregister_all(&self.failed);
        for conn in &pruned {
            conn.close();
            info!(client = %conn.id(), peer = %conn.peer(), "client dropped after failed send");
        }

        TickReport {
            delivered,
            pruned: pruned.len(),
        }
    }
}
