//! Secondary transition gates computed from auxiliary series.
//!
//! Each [`FilterSpec`] variant carries its own typed parameters and is
//! evaluated independently. Filters are grouped by [`FilterRole`]; the regime
//! state machine consumes the combined [`FilterGate`] of each role.

use serde::{Deserialize, Serialize};

use crate::data::{SeriesMap, TimeIndex};
use crate::error::{RotatorError, RotatorResult};
use crate::validation::check_series;

use super::composite::CompositeIndexSeries;
use super::rolling::RollingWindow;

/// Which transition a filter gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRole {
    /// Gates RISK_ON -> RISK_OFF.
    Euphoria,
    /// Gates RISK_OFF -> RISK_ON.
    RecoveryDoubt,
}

impl FilterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euphoria => "euphoria",
            Self::RecoveryDoubt => "recovery_doubt",
        }
    }
}

/// Filter kinds and their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Credit spread z-score below `z_threshold` and the spread widening.
    CreditSpreadReversal {
        series: String,
        z_window: usize,
        z_threshold: f64,
    },
    /// VIX level below `cap` and rising.
    VixTurnUp { series: String, cap: f64 },
    /// Leading composite first difference above `min_delta`.
    LeadingMomentum {
        #[serde(default)]
        min_delta: f64,
    },
}

impl FilterSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreditSpreadReversal { .. } => "credit_spread_reversal",
            Self::VixTurnUp { .. } => "vix_turn_up",
            Self::LeadingMomentum { .. } => "leading_momentum",
        }
    }

    /// Auxiliary series this filter reads, if any.
    pub fn aux_series(&self) -> Option<&str> {
        match self {
            Self::CreditSpreadReversal { series, .. } | Self::VixTurnUp { series, .. } => {
                Some(series)
            }
            Self::LeadingMomentum { .. } => None,
        }
    }

    pub fn validate(&self) -> RotatorResult<()> {
        if let Some(series) = self.aux_series() {
            if series.is_empty() {
                return Err(RotatorError::config(format!("{} has no series id", self.kind())));
            }
        }
        match self {
            Self::CreditSpreadReversal {
                z_window,
                z_threshold,
                ..
            } => {
                if *z_window < 2 {
                    return Err(RotatorError::config(format!(
                        "credit_spread_reversal z_window must be >= 2, got {}",
                        z_window
                    )));
                }
                if !z_threshold.is_finite() {
                    return Err(RotatorError::config("credit_spread_reversal z_threshold must be finite"));
                }
            }
            Self::VixTurnUp { cap, .. } => {
                if !cap.is_finite() {
                    return Err(RotatorError::config("vix_turn_up cap must be finite"));
                }
            }
            Self::LeadingMomentum { min_delta } => {
                if !min_delta.is_finite() {
                    return Err(RotatorError::config("leading_momentum min_delta must be finite"));
                }
            }
        }
        Ok(())
    }
}

/// A configured filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub role: FilterRole,
    pub spec: FilterSpec,
}

impl FilterConfig {
    pub fn id(&self) -> String {
        format!("{}:{}", self.role.as_str(), self.spec.kind())
    }
}

/// Per-timestamp activation of one filter; `None` while the filter warms up.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub id: String,
    pub role: FilterRole,
    pub values: Vec<Option<bool>>,
}

impl FilterResult {
    pub fn get(&self, i: usize) -> Option<bool> {
        self.values.get(i).copied().flatten()
    }
}

/// Combined state of all filters sharing a role at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterGate {
    /// No filter configured for the role: no constraint.
    Unconfigured,
    /// All filters active.
    Open,
    /// At least one filter inactive.
    Closed,
    /// At least one filter still warming up.
    Undefined,
}

impl FilterGate {
    /// Whether a transition may fire through this gate.
    pub fn permits(&self) -> bool {
        matches!(self, Self::Unconfigured | Self::Open)
    }
}

/// Combine every filter of `role` at position `i` (AND).
pub fn gate(results: &[FilterResult], role: FilterRole, i: usize) -> FilterGate {
    let mut gate = FilterGate::Unconfigured;
    for result in results.iter().filter(|r| r.role == role) {
        match result.values.get(i).copied().flatten() {
            None => return FilterGate::Undefined,
            Some(false) => gate = FilterGate::Closed,
            Some(true) => {
                if gate == FilterGate::Unconfigured {
                    gate = FilterGate::Open;
                }
            }
        }
    }
    gate
}

/// Inputs shared by every filter.
pub struct FilterContext<'a> {
    pub index: &'a TimeIndex,
    pub auxiliary: &'a SeriesMap,
    pub leading: &'a CompositeIndexSeries,
}

fn aux_values(ctx: &FilterContext<'_>, id: &str, kind: &str) -> RotatorResult<Vec<Option<f64>>> {
    let series = ctx.auxiliary.get(id).ok_or_else(|| {
        RotatorError::config(format!("{} references undefined series {}", kind, id))
    })?;
    check_series(ctx.index, series)?;
    Ok(series.values.clone())
}

fn credit_spread_reversal(values: &[Option<f64>], z_window: usize, z_threshold: f64) -> Vec<Option<bool>> {
    let mut window = RollingWindow::new(z_window);
    let mut prev: Option<f64> = None;
    values
        .iter()
        .map(|v| {
            let x = (*v)?;
            window.push(x);
            let z = window.zscore(x);
            let widening = prev.map(|p| x > p);
            prev = Some(x);
            Some(z? < z_threshold && widening?)
        })
        .collect()
}

fn vix_turn_up(values: &[Option<f64>], cap: f64) -> Vec<Option<bool>> {
    let mut prev: Option<f64> = None;
    values
        .iter()
        .map(|v| {
            let x = (*v)?;
            let rising = prev.map(|p| x > p);
            prev = Some(x);
            Some(x < cap && rising?)
        })
        .collect()
}

/// Evaluate one filter over the whole index.
pub fn evaluate_filter(filter: &FilterConfig, ctx: &FilterContext<'_>) -> RotatorResult<FilterResult> {
    let values = match &filter.spec {
        FilterSpec::CreditSpreadReversal {
            series,
            z_window,
            z_threshold,
        } => {
            let raw = aux_values(ctx, series, filter.spec.kind())?;
            credit_spread_reversal(&raw, *z_window, *z_threshold)
        }
        FilterSpec::VixTurnUp { series, cap } => {
            let raw = aux_values(ctx, series, filter.spec.kind())?;
            vix_turn_up(&raw, *cap)
        }
        FilterSpec::LeadingMomentum { min_delta } => (0..ctx.leading.len())
            .map(|i| ctx.leading.delta(i).map(|d| d > *min_delta))
            .collect(),
    };

    Ok(FilterResult {
        id: filter.id(),
        role: filter.role,
        values,
    })
}

/// Evaluate every configured filter, in configuration order. No filters means
/// no constraint: the gates report [`FilterGate::Unconfigured`].
pub fn evaluate_filters(filters: &[FilterConfig], ctx: &FilterContext<'_>) -> RotatorResult<Vec<FilterResult>> {
    filters.iter().map(|f| evaluate_filter(f, ctx)).collect()
}
