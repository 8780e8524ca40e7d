use sinecast::signal::sample;
use sinecast::{ControlMessage, ParameterBounds, ParameterStore, Sample, WaveParameters};
use proptest::prelude::*;

fn positive() -> impl Strategy<Value = f64> {
    1e-3..1e3f64
}

fn any_field() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        Just(None),
        (-1e3..1e3f64).prop_map(Some),
        Just(Some(f64::NAN)),
        Just(Some(f64::INFINITY)),
    ]
}

proptest! {
    #[test]
    fn output_is_bounded_by_amplitude(
        amplitude in positive(),
        frequency in positive(),
        phase in -10.0..10.0f64,
        t in 0.0..1e4f64,
    ) {
        let v = sample(amplitude, frequency, phase, t);
        prop_assert!(v.abs() <= amplitude * (1.0 + 1e-12));
    }

    #[test]
    fn output_repeats_every_period(
        amplitude in positive(),
        frequency in 0.1..100.0f64,
        phase in -10.0..10.0f64,
        t in 0.0..100.0f64,
    ) {
        let a = sample(amplitude, frequency, phase, t);
        let b = sample(amplitude, frequency, phase, t + 1.0 / frequency);
        prop_assert!((a - b).abs() <= 1e-7 * amplitude.max(1.0), "{a} vs {b}");
    }

    #[test]
    fn partial_update_leaves_absent_fields(
        amplitude in positive(),
        frequency in positive(),
        new_amplitude in proptest::option::of(positive()),
        new_frequency in proptest::option::of(positive()),
    ) {
        let store = ParameterStore::new(WaveParameters::new(amplitude, frequency, 0.5));
        let msg = ControlMessage { amplitude: new_amplitude, frequency: new_frequency };
        let after = store.apply(&msg);

        prop_assert_eq!(after.amplitude, new_amplitude.unwrap_or(amplitude));
        prop_assert_eq!(after.frequency, new_frequency.unwrap_or(frequency));
        prop_assert_eq!(after.phase, 0.5);
        prop_assert_eq!(store.get(), after);
    }

    #[test]
    fn accepted_updates_are_finite_and_positive(
        amplitude in any_field(),
        frequency in any_field(),
    ) {
        let msg = ControlMessage { amplitude, frequency };
        if let Ok(valid) = msg.validate(&ParameterBounds::default()) {
            for v in [valid.amplitude, valid.frequency].into_iter().flatten() {
                prop_assert!(v.is_finite() && v > 0.0);
            }
        }
    }

    #[test]
    fn ceiling_is_inclusive(max in positive(), value in positive()) {
        let msg = ControlMessage { amplitude: Some(value), frequency: None };
        let accepted = msg.validate(&ParameterBounds::with_max(max)).is_ok();
        prop_assert_eq!(accepted, value <= max);
    }

    #[test]
    fn sample_line_decodes_to_same_sample(
        amplitude in positive(),
        frequency in positive(),
        t in 0.0..2e9f64,
    ) {
        let original = WaveParameters::new(amplitude, frequency, 0.0).sample_at(t);
        let mut line = Vec::new();
        original.encode_line(&mut line).unwrap();

        prop_assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        prop_assert_eq!(Sample::decode_line(&line).unwrap(), original);
    }
}
