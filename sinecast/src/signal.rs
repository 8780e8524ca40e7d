//! Sine wave generation and the sample record streamed to observers.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Evaluates `amplitude * sin(2π * frequency * t + phase)`.
///
/// Pure and infallible: NaN or infinite inputs yield NaN or infinite output.
#[inline]
#[must_use]
pub fn sample(amplitude: f64, frequency: f64, phase: f64, t: f64) -> f64 {
    amplitude * (TAU * frequency * t + phase).sin()
}

/// Parameters of the generated waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParameters {
    /// Peak value of the wave.
    pub amplitude: f64,
    /// Cycles per second.
    pub frequency: f64,
    /// Phase offset in radians. Never changed by the server once started.
    pub phase: f64,
}

impl WaveParameters {
    #[must_use]
    pub const fn new(amplitude: f64, frequency: f64, phase: f64) -> Self {
        Self {
            amplitude,
            frequency,
            phase,
        }
    }

    /// Evaluates the wave at absolute time `t` (seconds).
    #[inline]
    #[must_use]
    pub fn value_at(&self, t: f64) -> f64 {
        sample(self.amplitude, self.frequency, self.phase, t)
    }

    /// Builds the sample record for time `t`.
    #[must_use]
    pub fn sample_at(&self, t: f64) -> Sample {
        Sample {
            time: t,
            value: self.value_at(t),
            amplitude: self.amplitude,
            frequency: self.frequency,
        }
    }
}

impl Default for WaveParameters {
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.0)
    }
}

/// One point of the stream, tagged with the parameters that produced it.
///
/// Serialized as a single JSON object with the fields in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time in seconds since the Unix epoch.
    pub time: f64,
    pub value: f64,
    pub amplitude: f64,
    pub frequency: f64,
}

impl Sample {
    /// Serializes this sample as one newline-terminated JSON line into `buf`.
    ///
    /// `buf` is cleared first so the broadcaster can reuse one allocation
    /// across ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, which only happens if a
    /// writer to a `Vec` fails.
    pub fn encode_line(&self, buf: &mut Vec<u8>) -> serde_json::Result<()> {
        buf.clear();
        serde_json::to_writer(&mut *buf, self)?;
        buf.push(b'\n');
        Ok(())
    }

    /// Parses a sample from one line, with or without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a JSON object with the four
    /// numeric fields.
    pub fn decode_line(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line.trim_ascii_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn sample_known_points() {
        assert!(sample(1.0, 1.0, 0.0, 0.0).abs() < EPS);
        assert!((sample(1.0, 1.0, 0.0, 0.25) - 1.0).abs() < EPS);
        assert!((sample(2.5, 1.0, 0.0, 0.75) + 2.5).abs() < EPS);
        assert!((sample(1.0, 2.0, 0.0, 0.125) - 1.0).abs() < EPS);
    }

    #[test]
    fn phase_shifts_the_wave() {
        let shifted = sample(1.0, 1.0, std::f64::consts::FRAC_PI_2, 0.0);
        assert!((shifted - 1.0).abs() < EPS);
    }

    #[test]
    fn non_finite_inputs_propagate() {
        assert!(sample(f64::NAN, 1.0, 0.0, 0.3).is_nan());
        assert!(sample(1.0, 1.0, 0.0, f64::INFINITY).is_nan());
        assert!(sample(f64::INFINITY, 1.0, 0.0, 0.25).is_infinite());
    }

    #[test]
    fn defaults() {
        let params = WaveParameters::default();
        assert_eq!(params, WaveParameters::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn sample_at_carries_parameters() {
        let params = WaveParameters::new(3.0, 0.5, 0.0);
        let s = params.sample_at(0.5);
        assert_eq!(s.time, 0.5);
        assert!((s.value - 3.0).abs() < EPS);
        assert_eq!(s.amplitude, 3.0);
        assert_eq!(s.frequency, 0.5);
    }

    #[test]
    fn encode_line_field_order_and_newline() {
        let s = Sample {
            time: 1.5,
            value: -0.25,
            amplitude: 1.0,
            frequency: 2.0,
        };
        let mut buf = b"stale".to_vec();
        s.encode_line(&mut buf).unwrap();
        assert_eq!(
            std::str::from_utf8(&buf).unwrap(),
            "{\"time\":1.5,\"value\":-0.25,\"amplitude\":1.0,\"frequency\":2.0}\n"
        );
    }

    #[test]
    fn decode_line_accepts_trailing_whitespace() {
        let s = Sample::decode_line(b"{\"time\":2.0,\"value\":0.5,\"amplitude\":1.0,\"frequency\":1.0}\r\n")
            .unwrap();
        assert_eq!(s.time, 2.0);
        assert_eq!(s.value, 0.5);
    }

    #[test]
    fn decode_line_rejects_missing_field() {
        assert!(Sample::decode_line(b"{\"time\":2.0,\"value\":0.5}").is_err());
    }
}
