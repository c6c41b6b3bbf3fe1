use serde::{Deserialize, Serialize};

use crate::error::MurmurError;

/// Window length and the overlap between consecutive windows, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSpec {
    pub length_secs: f64,
    pub overlap_secs: f64,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            length_secs: 3.0,
            overlap_secs: 1.0,
        }
    }
}

impl WindowSpec {
    pub fn step_secs(&self) -> f64 {
        self.length_secs - self.overlap_secs
    }

    pub fn validate(&self) -> Result<(), MurmurError> {
        if self.length_secs > 0.0 && self.overlap_secs >= 0.0 && self.step_secs() > 0.0 {
            Ok(())
        } else {
            Err(MurmurError::InvalidWindow {
                length: self.length_secs,
                overlap: self.overlap_secs,
            })
        }
    }
}

/// Start offsets of the overlapping windows that fit into `duration` seconds.
///
/// Windows advance by `length - overlap` and the whole run is centered in the
/// clip, leaving equal slack at both ends. A clip shorter than one window
/// yields nothing.
///
/// ```
/// use murmur_core::dataset::{window_offsets, WindowSpec};
/// assert_eq!(vec![0.5, 2.5], window_offsets(6.0, WindowSpec::default()));
/// ```
pub fn window_offsets(duration: f64, spec: WindowSpec) -> Vec<f64> {
    if spec.validate().is_err() || !duration.is_finite() || duration < spec.length_secs {
        return Vec::new();
    }

    let step = spec.step_secs();
    let iterations = ((duration - spec.length_secs) / step).trunc() as usize + 1;
    let initial_offset = (duration - (iterations as f64 * step + spec.overlap_secs)) / 2.0;

    (0..iterations)
        .map(|i| initial_offset + i as f64 * step)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_offsets(expected: &[f64], actual: &[f64]) {
        assert_eq!(expected.len(), actual.len(), "{actual:?}");
        for (e, a) in expected.iter().zip(actual) {
            assert!((e - a).abs() < EPS, "expected {expected:?}, got {actual:?}");
        }
    }

    #[test]
    fn test_too_short() {
        assert!(window_offsets(0.0, WindowSpec::default()).is_empty());
        assert!(window_offsets(2.999, WindowSpec::default()).is_empty());
    }

    #[test]
    fn test_exact_window() {
        assert_offsets(&[0.0], &window_offsets(3.0, WindowSpec::default()));
    }

    #[test]
    fn test_single_window_centered() {
        // 4.5s: one window, 0.75s of slack on each side.
        assert_offsets(&[0.75], &window_offsets(4.5, WindowSpec::default()));
    }

    #[test]
    fn test_two_windows() {
        assert_offsets(&[0.0, 2.0], &window_offsets(5.0, WindowSpec::default()));
        assert_offsets(&[0.45, 2.45], &window_offsets(5.9, WindowSpec::default()));
    }

    #[test]
    fn test_many_windows() {
        let offsets = window_offsets(27.3, WindowSpec::default());
        assert_eq!(13, offsets.len());
        assert!((offsets[0] - 0.15).abs() < EPS);
        for pair in offsets.windows(2) {
            assert!((pair[1] - pair[0] - 2.0).abs() < EPS);
        }
    }

    #[test]
    fn test_windows_fit_and_are_centered() {
        let spec = WindowSpec::default();
        for tenth in 30..400 {
            let duration = f64::from(tenth) / 10.0;
            let offsets = window_offsets(duration, spec);
            assert!(!offsets.is_empty());

            let first = offsets[0];
            let last_end = offsets[offsets.len() - 1] + spec.length_secs;
            assert!(first >= -EPS, "{duration}: {offsets:?}");
            assert!(last_end <= duration + EPS, "{duration}: {offsets:?}");
            assert!((first - (duration - last_end)).abs() < EPS, "{duration}");
        }
    }

    #[test]
    fn test_custom_spec() {
        let spec = WindowSpec {
            length_secs: 2.0,
            overlap_secs: 0.0,
        };
        assert_offsets(&[0.5, 2.5, 4.5], &window_offsets(7.0, spec));
    }

    #[test]
    fn test_invalid_spec() {
        let spec = WindowSpec {
            length_secs: 2.0,
            overlap_secs: 2.0,
        };
        assert!(spec.validate().is_err());
        assert!(window_offsets(10.0, spec).is_empty());
    }
}
