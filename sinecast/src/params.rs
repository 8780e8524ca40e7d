//! Shared wave parameters and the control messages that update them.
//!
//! The [`ParameterStore`] is written by the control thread and read once per
//! tick by the broadcaster. Every read returns a snapshot taken under one
//! lock acquisition, so a tick never mixes fields from two different updates.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::signal::WaveParameters;

/// A partial parameter update sent by an observer.
///
/// Absent fields leave the stored value untouched. Unknown fields are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

/// Which field a rejected value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Amplitude,
    Frequency,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amplitude => f.write_str("amplitude"),
            Self::Frequency => f.write_str("frequency"),
        }
    }
}

/// Error parsing or validating a control line.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The line is not a JSON object with numeric fields.
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A field is non-finite, non-positive, or above the configured ceiling.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: Field, value: f64 },
}

/// Accepted range for amplitude and frequency updates.
///
/// Values must always be finite and strictly positive. `max` adds an
/// optional inclusive ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParameterBounds {
    pub max: Option<f64>,
}

impl ParameterBounds {
    /// Bounds with an inclusive upper limit.
    #[must_use]
    pub const fn with_max(max: f64) -> Self {
        Self { max: Some(max) }
    }

    fn check(&self, field: Field, value: f64) -> Result<f64, ControlError> {
        let in_range =
            value.is_finite() && value > 0.0 && self.max.is_none_or(|max| value <= max);
        if in_range {
            Ok(value)
        } else {
            Err(ControlError::OutOfRange { field, value })
        }
    }
}

impl ControlMessage {
    /// Parses one control line and validates it against `bounds`.
    ///
    /// Surrounding whitespace (including a `\r` before the newline) is
    /// ignored. A message with no recognized fields is valid and changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Malformed`] for invalid JSON, anything but an
    /// object, or non-numeric fields, and [`ControlError::OutOfRange`] for
    /// rejected values.
    pub fn parse_line(line: &[u8], bounds: &ParameterBounds) -> Result<Self, ControlError> {
        // A derived struct deserializer also accepts arrays; only objects are messages.
        let object: Map<String, Value> = serde_json::from_slice(line.trim_ascii())?;
        let msg: Self = serde_json::from_value(Value::Object(object))?;
        msg.validate(bounds)
    }

    /// Checks every present field against `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::OutOfRange`] for the first rejected field.
    pub fn validate(self, bounds: &ParameterBounds) -> Result<Self, ControlError> {
        if let Some(a) = self.amplitude {
            bounds.check(Field::Amplitude, a)?;
        }
        if let Some(f) = self.frequency {
            bounds.check(Field::Frequency, f)?;
        }
        Ok(self)
    }

    /// Returns true if the message carries no field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.amplitude.is_none() && self.frequency.is_none()
    }

    /// Serializes this message as one newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Wave parameters shared between the control and broadcast threads.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: RwLock<WaveParameters>,
}

impl ParameterStore {
    #[must_use]
    pub fn new(initial: WaveParameters) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Returns a consistent snapshot of the current parameters.
    #[must_use]
    pub fn get(&self) -> WaveParameters {
        *self.inner.read()
    }

    /// Applies a partial update atomically and returns the resulting parameters.
    pub fn apply(&self, msg: &ControlMessage) -> WaveParameters {
        let mut params = self.inner.write();
        if let Some(a) = msg.amplitude {
            params.amplitude = a;
        }
        if let Some(f) = msg.frequency {
            params.frequency = f;
        }
        *params
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn parse(line: &str) -> Result<ControlMessage, ControlError> {
        ControlMessage::parse_line(line.as_bytes(), &ParameterBounds::default())
    }

    #[test]
    fn parse_full_message() {
        let msg = parse("{\"amplitude\": 2.5, \"frequency\": 3.0}").unwrap();
        assert_eq!(msg.amplitude, Some(2.5));
        assert_eq!(msg.frequency, Some(3.0));
    }

    #[test]
    fn parse_partial_and_empty() {
        let msg = parse("{\"frequency\": 2}\r\n").unwrap();
        assert_eq!(msg, ControlMessage { amplitude: None, frequency: Some(2.0) });

        let empty = parse("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn parse_ignores_unknown_fields() {
        let msg = parse("{\"amplitude\": 1.5, \"phase\": 3.0}").unwrap();
        assert_eq!(msg.amplitude, Some(1.5));
        assert_eq!(msg.frequency, None);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(parse("not json"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("{\"amplitude\": \"2.0\"}"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("[1.0, 2.0]"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("[]"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("2.0"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("null"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("{\"amplitude\": null}"), Ok(m) if m.is_empty()));
    }

    #[test]
    fn parse_rejects_non_positive() {
        let err = parse("{\"frequency\": -1.0}").unwrap_err();
        assert!(matches!(
            err,
            ControlError::OutOfRange { field: Field::Frequency, value } if value == -1.0
        ));
        assert!(matches!(parse("{\"amplitude\": 0}"), Err(ControlError::OutOfRange { .. })));
    }

    #[test]
    fn bounds_ceiling_is_inclusive() {
        let bounds = ParameterBounds::with_max(10.0);
        assert!(ControlMessage::parse_line(b"{\"amplitude\": 10.0}", &bounds).is_ok());
        assert!(ControlMessage::parse_line(b"{\"amplitude\": 10.5}", &bounds).is_err());
    }

    #[test]
    fn to_line_skips_absent_fields() {
        let msg = ControlMessage { amplitude: None, frequency: Some(2.0) };
        assert_eq!(msg.to_line().unwrap(), b"{\"frequency\":2.0}\n");
    }

    #[test]
    fn apply_partial_update_keeps_other_fields() {
        let store = ParameterStore::new(WaveParameters::new(1.0, 1.0, 0.5));

        let after = store.apply(&ControlMessage { amplitude: None, frequency: Some(2.0) });
        assert_eq!(after, WaveParameters::new(1.0, 2.0, 0.5));

        let after = store.apply(&ControlMessage { amplitude: Some(4.0), frequency: None });
        assert_eq!(after, WaveParameters::new(4.0, 2.0, 0.5));
        assert_eq!(store.get(), after);
    }

    #[test]
    fn concurrent_updates_never_tear() {
        let store = Arc::new(ParameterStore::new(WaveParameters::new(1.0, 1.0, 0.0)));

        let writers: Vec<_> = (1..=4)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        let v = f64::from(w * 10_000 + i);
                        store.apply(&ControlMessage { amplitude: Some(v), frequency: Some(v) });
                    }
                })
            })
            .collect();

        for _ in 0..10_000 {
            let p = store.get();
            assert_eq!(p.amplitude, p.frequency, "snapshot mixed two updates");
        }

        for w in writers {
            w.join().unwrap();
        }
        let p = store.get();
        assert_eq!(p.amplitude, p.frequency);
    }
}
