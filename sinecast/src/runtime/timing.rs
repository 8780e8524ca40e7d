//! Timing primitives for the broadcast loop.
//!
//! Tick deadlines use the monotonic TSC-backed [`minstant::Instant`]; sample
//! timestamps use wall-clock time derived from the same counter through an
//! [`Anchor`].

use std::fmt;
use std::time::Duration;

use minstant::{Anchor, Instant};

/// Fixed-period tick deadlines without catch-up.
///
/// After each tick the caller asks how long to sleep. A tick that finishes
/// past its deadline gets no sleep, and the schedule restarts one period
/// after that moment instead of firing a burst of late ticks.
#[derive(Debug, Clone, Copy)]
pub struct TickSchedule {
    period: Duration,
    deadline: Instant,
}

impl TickSchedule {
    /// Starts a schedule whose first deadline is one period after `start`.
    #[must_use]
    pub fn starting_at(start: Instant, period: Duration) -> Self {
        Self {
            period,
            deadline: start + period,
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Returns how long to sleep at `now` and advances to the next deadline.
    ///
    /// Never returns a negative or catch-up duration: an overrun yields
    /// [`Duration::ZERO`].
    pub fn advance(&mut self, now: Instant) -> Duration {
        if now < self.deadline {
            let sleep = self.deadline - now;
            self.deadline = self.deadline + self.period;
            sleep
        } else {
            self.deadline = now + self.period;
            Duration::ZERO
        }
    }
}

/// Converts a tick rate in Hz to a tick period.
///
/// Returns `None` if the rate is not finite and positive, or if its period
/// does not fit a [`Duration`] or rounds down to zero.
#[must_use]
pub fn period_from_rate(rate_hz: f64) -> Option<Duration> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(rate_hz.recip())
        .ok()
        .filter(|period| !period.is_zero())
}

/// Wall-clock seconds since the Unix epoch.
pub struct WallClock {
    anchor: Anchor,
}

impl fmt::Debug for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WallClock").finish_non_exhaustive()
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: Anchor::new(),
        }
    }

    /// Current time as fractional Unix seconds.
    #[must_use]
    pub fn now_secs(&self) -> f64 {
        Instant::now().as_unix_nanos(&self.anchor) as f64 / 1e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(10);

    /// Instant arithmetic goes through cycle counts, so allow sub-microsecond error.
    fn assert_near(actual: Duration, expected: Duration) {
        let diff = actual.abs_diff(expected);
        assert!(diff < Duration::from_micros(1), "{actual:?} != {expected:?}");
    }

    #[test]
    fn sleeps_until_deadline() {
        let start = Instant::now();
        let mut schedule = TickSchedule::starting_at(start, PERIOD);

        assert_near(schedule.advance(start + Duration::from_millis(3)), Duration::from_millis(7));
        assert_near(schedule.advance(start + Duration::from_millis(12)), Duration::from_millis(8));
    }

    #[test]
    fn overrun_does_not_burst() {
        let start = Instant::now();
        let mut schedule = TickSchedule::starting_at(start, PERIOD);

        // Tick took five periods.
        assert_eq!(schedule.advance(start + Duration::from_millis(50)), Duration::ZERO);
        // Next deadline is one period after the overrun, not the stale 20ms mark.
        assert_near(schedule.advance(start + Duration::from_millis(55)), Duration::from_millis(5));
    }

    #[test]
    fn exact_deadline_counts_as_overrun() {
        let start = Instant::now();
        let mut schedule = TickSchedule::starting_at(start, PERIOD);
        assert_eq!(schedule.advance(start + PERIOD), Duration::ZERO);
    }

    #[test]
    fn rate_to_period() {
        assert_eq!(period_from_rate(100.0), Some(Duration::from_millis(10)));
        assert_eq!(period_from_rate(0.5), Some(Duration::from_secs(2)));
    }

    #[test]
    fn unusable_rates_are_rejected() {
        for rate in [0.0, -5.0, f64::NAN, f64::INFINITY, 1e-30, 1e30] {
            assert_eq!(period_from_rate(rate), None, "rate {rate}");
        }
    }

    #[test]
    fn wall_clock_debug() {
        assert!(format!("{:?}", WallClock::new()).starts_with("WallClock"));
    }

    #[test]
    fn wall_clock_is_near_system_time() {
        let clock = WallClock::new();
        let system = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert!((clock.now_secs() - system).abs() < 1.0);
    }
}
