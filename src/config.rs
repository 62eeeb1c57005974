//! Rotator configuration.
//!
//! Everything is validated eagerly by [`RotatorConfig::validate`]; a config that
//! passes validation cannot fail later for configuration reasons, except for
//! series ids that are only checked once a dataset is bound.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backtest::{BacktestConfig, BenchmarkConfig};
use crate::error::{RotatorError, RotatorResult};
use crate::regime::Regime;
use crate::signals::FilterConfig;

/// How a raw series is converted before standardization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Identity.
    Level,
    /// Relative change over 12 periods.
    Yoy,
    /// Relative change over 1 period.
    Mom,
    /// Absolute first difference.
    Diff,
    /// Log first difference.
    Logdiff,
}

impl TransformKind {
    /// Number of periods consumed before the first transformed value.
    pub fn lag(&self) -> usize {
        match self {
            Self::Level => 0,
            Self::Yoy => 12,
            Self::Mom | Self::Diff | Self::Logdiff => 1,
        }
    }
}

/// Sign convention: `Positive` means higher raw values are healthier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Positive),
            -1 => Ok(Self::Negative),
            other => Err(format!("direction must be +1 or -1, got {}", other)),
        }
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }
}

/// One constituent of a composite index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub id: String,
    pub transform: TransformKind,
    pub direction: Direction,
    pub weight: f64,
}

impl SeriesConfig {
    pub fn new(id: &str, transform: TransformKind, direction: Direction, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            transform,
            direction,
            weight,
        }
    }
}

/// The two composite groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorGroup {
    Leading,
    Coincident,
}

impl IndicatorGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leading => "leading",
            Self::Coincident => "coincident",
        }
    }
}

/// What to do with group weights that do not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    /// Rescale weights so each group sums to one.
    #[default]
    Normalize,
    /// Reject groups whose weights do not already sum to one.
    Strict,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// A validated, weight-normalized group of series configs.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup {
    pub group: IndicatorGroup,
    pub series: Vec<SeriesConfig>,
}

impl SeriesGroup {
    /// Validate a group and apply the weight policy.
    pub fn new(
        group: IndicatorGroup,
        configs: &[SeriesConfig],
        policy: WeightPolicy,
    ) -> RotatorResult<Self> {
        if configs.is_empty() {
            return Err(RotatorError::config(format!(
                "{} group has no series",
                group.as_str()
            )));
        }

        let mut seen = HashSet::new();
        for cfg in configs {
            if !seen.insert(cfg.id.as_str()) {
                return Err(RotatorError::config(format!(
                    "duplicate series id {} in {} group",
                    cfg.id,
                    group.as_str()
                )));
            }
            if !cfg.weight.is_finite() || cfg.weight <= 0.0 {
                return Err(RotatorError::config(format!(
                    "weight of {} must be positive and finite, got {}",
                    cfg.id, cfg.weight
                )));
            }
        }

        let total: f64 = configs.iter().map(|c| c.weight).sum();
        let series = match policy {
            WeightPolicy::Strict => {
                if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                    return Err(RotatorError::config(format!(
                        "{} weights sum to {} under strict weight policy",
                        group.as_str(),
                        total
                    )));
                }
                configs.to_vec()
            }
            WeightPolicy::Normalize => {
                if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                    debug!(group = group.as_str(), total, "normalizing group weights");
                }
                configs
                    .iter()
                    .map(|c| SeriesConfig {
                        weight: c.weight / total,
                        ..c.clone()
                    })
                    .collect()
            }
        };

        Ok(Self { group, series })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.id.as_str())
    }
}

/// Full configuration surface of the rotator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    /// Leading indicator constituents.
    pub leading: Vec<SeriesConfig>,
    /// Coincident indicator constituents.
    pub coincident: Vec<SeriesConfig>,
    /// Weight normalization policy for both groups.
    pub weight_policy: WeightPolicy,
    /// Rolling z-score window (periods).
    pub z_window: usize,
    /// EMA span applied to the z-scores.
    pub smooth_window: usize,
    /// Leading index level below which an iceberg event is flagged.
    pub iceberg_threshold: f64,
    /// Coincident index level below which a sinking event is flagged.
    pub sinking_threshold: f64,
    /// Gap between the exit threshold and the re-entry threshold.
    pub hysteresis: f64,
    /// Consecutive qualifying periods required to switch.
    pub confirm_periods: u32,
    /// Also require a sinking event on every step of the exit streak.
    pub require_sinking_confirmation: bool,
    /// Secondary transition gates.
    pub filters: Vec<FilterConfig>,
    /// State before the first transition.
    pub initial_state: Regime,
    /// Portfolio accounting.
    pub backtest: BacktestConfig,
    /// Benchmark construction.
    pub benchmark: BenchmarkConfig,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            leading: Vec::new(),
            coincident: Vec::new(),
            weight_policy: WeightPolicy::Normalize,
            z_window: 36,
            smooth_window: 3,
            iceberg_threshold: -0.3,
            sinking_threshold: -0.5,
            hysteresis: 0.15,
            confirm_periods: 2,
            require_sinking_confirmation: false,
            filters: Vec::new(),
            initial_state: Regime::RiskOn,
            backtest: BacktestConfig::default(),
            benchmark: BenchmarkConfig::default(),
        }
    }
}

impl RotatorConfig {
    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> RotatorResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Re-entry level for RISK_ON.
    pub fn recovery_threshold(&self) -> f64 {
        self.iceberg_threshold + self.hysteresis
    }

    /// Validate every parameter that does not depend on the dataset.
    pub fn validate(&self) -> RotatorResult<()> {
        self.validate_regime_params()?;

        if self.z_window < 2 {
            return Err(RotatorError::config(format!(
                "z_window must be >= 2, got {}",
                self.z_window
            )));
        }
        if self.smooth_window < 1 {
            return Err(RotatorError::config("smooth_window must be >= 1"));
        }

        self.leading_group()?;
        self.coincident_group()?;

        for filter in &self.filters {
            filter.spec.validate()?;
        }

        self.backtest.validate()?;
        self.benchmark.validate()?;
        Ok(())
    }

    /// Parameters the state machine depends on; also checked by the sweep for
    /// every grid point.
    pub fn validate_regime_params(&self) -> RotatorResult<()> {
        if self.confirm_periods < 1 {
            return Err(RotatorError::config("confirm_periods must be >= 1"));
        }
        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            return Err(RotatorError::config(format!(
                "hysteresis must be finite and >= 0, got {}",
                self.hysteresis
            )));
        }
        if !self.iceberg_threshold.is_finite() || !self.sinking_threshold.is_finite() {
            return Err(RotatorError::config("thresholds must be finite"));
        }
        if self.sinking_threshold > self.iceberg_threshold {
            return Err(RotatorError::config(format!(
                "sinking_threshold ({}) must not be above iceberg_threshold ({})",
                self.sinking_threshold, self.iceberg_threshold
            )));
        }
        Ok(())
    }

    pub fn leading_group(&self) -> RotatorResult<SeriesGroup> {
        SeriesGroup::new(IndicatorGroup::Leading, &self.leading, self.weight_policy)
    }

    pub fn coincident_group(&self) -> RotatorResult<SeriesGroup> {
        SeriesGroup::new(IndicatorGroup::Coincident, &self.coincident, self.weight_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{FilterRole, FilterSpec};

    fn base_config() -> RotatorConfig {
        RotatorConfig {
            leading: vec![
                SeriesConfig::new("T10Y3M", TransformKind::Level, Direction::Positive, 2.0),
                SeriesConfig::new("ICSA", TransformKind::Yoy, Direction::Negative, 2.0),
            ],
            coincident: vec![SeriesConfig::new(
                "PAYEMS",
                TransformKind::Yoy,
                Direction::Positive,
                1.0,
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_transform_lags() {
        assert_eq!(TransformKind::Level.lag(), 0);
        assert_eq!(TransformKind::Yoy.lag(), 12);
        assert_eq!(TransformKind::Mom.lag(), 1);
        assert_eq!(TransformKind::Logdiff.lag(), 1);
    }

    #[test]
    fn test_default_config_validates_with_series() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_normalize_policy_rescales_weights() {
        let group = base_config().leading_group().unwrap();
        assert_eq!(group.series[0].weight, 0.5);
        assert_eq!(group.series[1].weight, 0.5);
    }

    #[test]
    fn test_strict_policy_rejects_unnormalized() {
        let config = RotatorConfig {
            weight_policy: WeightPolicy::Strict,
            ..base_config()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[test]
    fn test_rejects_bad_regime_params() {
        let config = RotatorConfig {
            confirm_periods: 0,
            ..base_config()
        };
        assert!(config.validate().is_err());

        let config = RotatorConfig {
            hysteresis: -0.1,
            ..base_config()
        };
        assert!(config.validate().is_err());

        let config = RotatorConfig {
            sinking_threshold: 0.0,
            iceberg_threshold: -0.3,
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_and_nonpositive_weights() {
        let mut config = base_config();
        config.leading.push(config.leading[0].clone());
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.coincident[0].weight = 0.0;
        assert!(config.validate().is_err());

        let config = RotatorConfig {
            coincident: Vec::new(),
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_filter_window() {
        let config = RotatorConfig {
            filters: vec![FilterConfig {
                role: FilterRole::Euphoria,
                spec: FilterSpec::CreditSpreadReversal {
                    series: "BAMLH0A0HYM2".to_string(),
                    z_window: 1,
                    z_threshold: -1.0,
                },
            }],
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_of_direction() {
        let json = r#"{"id":"ICSA","transform":"yoy","direction":-1,"weight":1.0}"#;
        let cfg: SeriesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.direction, Direction::Negative);
        assert!(serde_json::from_str::<SeriesConfig>(
            r#"{"id":"X","transform":"level","direction":2,"weight":1.0}"#
        )
        .is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RotatorConfig = serde_json::from_str(r#"{"confirm_periods": 3}"#).unwrap();
        assert_eq!(config.confirm_periods, 3);
        assert_eq!(config.z_window, 36);
        assert_eq!(config.initial_state, Regime::RiskOn);
        assert!((config.recovery_threshold() - (-0.15)).abs() < 1e-12);
    }

    #[test]
    fn test_sample_config_file_validates() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.json");
        let config = RotatorConfig::from_json_file(path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.leading.len(), 4);
        assert_eq!(config.filters.len(), 2);
        assert_eq!(config.backtest.price_safe.open.as_deref(), Some("TLT_open"));
    }
}
