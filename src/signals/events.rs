//! Iceberg / sinking / recovery event detection.
//!
//! Pure function of the current index readings; memory lives in the regime
//! state machine.

use serde::{Deserialize, Serialize};

/// Static thresholds the detector compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventThresholds {
    pub iceberg: f64,
    pub sinking: f64,
    pub hysteresis: f64,
}

impl EventThresholds {
    /// Leading level that must be exceeded to flag a recovery.
    pub fn recovery_level(&self) -> f64 {
        self.iceberg + self.hysteresis
    }
}

/// Event flags and momentum for one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventFlags {
    pub iceberg: bool,
    pub sinking: bool,
    pub recovery_candidate: bool,
    /// First difference of the leading index (0 when there is no previous value).
    pub d_leading: f64,
}

/// Evaluate the event flags for one timestamp.
pub fn detect(
    leading: f64,
    leading_prev: Option<f64>,
    coincident: f64,
    thresholds: &EventThresholds,
) -> EventFlags {
    EventFlags {
        iceberg: leading < thresholds.iceberg,
        sinking: coincident < thresholds.sinking,
        recovery_candidate: leading > thresholds.recovery_level(),
        d_leading: leading_prev.map(|p| leading - p).unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: EventThresholds = EventThresholds {
        iceberg: -0.3,
        sinking: -0.5,
        hysteresis: 0.15,
    };

    #[test]
    fn test_iceberg_and_sinking() {
        let flags = detect(-0.4, Some(0.2), -0.6, &THRESHOLDS);
        assert!(flags.iceberg);
        assert!(flags.sinking);
        assert!(!flags.recovery_candidate);
        assert!(flags.d_leading < 0.0);
    }

    #[test]
    fn test_first_timestamp_is_neutral() {
        let flags = detect(0.2, None, 0.0, &THRESHOLDS);
        assert_eq!(flags.d_leading, 0.0);
        assert!(!flags.iceberg);
    }

    #[test]
    fn test_hysteresis_band() {
        // between the exit threshold and the re-entry level nothing is flagged
        let flags = detect(-0.2, Some(-0.25), 0.0, &THRESHOLDS);
        assert!(!flags.iceberg);
        assert!(!flags.recovery_candidate);

        let flags = detect(-0.1, Some(-0.2), 0.0, &THRESHOLDS);
        assert!(flags.recovery_candidate);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let flags = detect(-0.3, None, -0.5, &THRESHOLDS);
        assert!(!flags.iceberg);
        assert!(!flags.sinking);
    }
}
