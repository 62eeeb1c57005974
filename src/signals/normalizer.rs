//! Series normalizer.
//!
//! `value[t] = EMA(rolling_zscore(direction * transform(raw), z_window), smooth_window)`
//!
//! Output is aligned to the input index; warm-up positions are `None`.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::config::{SeriesConfig, SeriesGroup, TransformKind};
use crate::data::{Series, SeriesMap, TimeIndex};
use crate::error::{RotatorError, RotatorResult};
use crate::validation::check_series;

use super::rolling::{Ema, RollingWindow};

/// A directionally consistent, standardized and smoothed series.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub id: String,
    pub values: Vec<Option<f64>>,
}

impl NormalizedSeries {
    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied().flatten()
    }

    /// Position of the first valid value.
    pub fn first_valid(&self) -> Option<usize> {
        self.values.iter().position(|v| v.is_some())
    }
}

/// Normalized series keyed by id.
pub type NormalizedMap = BTreeMap<String, NormalizedSeries>;

/// Apply the transform to one observation.
fn transform_point(kind: TransformKind, current: f64, lagged: f64) -> Option<f64> {
    let value = match kind {
        TransformKind::Level => current,
        TransformKind::Yoy | TransformKind::Mom => {
            if lagged == 0.0 {
                return None;
            }
            current / lagged - 1.0
        }
        TransformKind::Diff => current - lagged,
        TransformKind::Logdiff => {
            if current <= 0.0 || lagged <= 0.0 {
                return None;
            }
            current.ln() - lagged.ln()
        }
    };
    value.is_finite().then_some(value)
}

/// Transform a raw series. Positions without a transformed value are `None`.
pub fn transform(
    raw: &Series,
    kind: TransformKind,
    index: &TimeIndex,
) -> RotatorResult<Vec<Option<f64>>> {
    let mut out = vec![None; raw.len()];
    let Some(start) = check_series(index, raw)? else {
        return Ok(out);
    };
    let lag = kind.lag();

    for i in (start + lag)..raw.len() {
        // check_series guarantees observations from `start` on
        let current = raw.get(i).unwrap_or(f64::NAN);
        let lagged = raw.get(i - lag).unwrap_or(f64::NAN);
        let value = transform_point(kind, current, lagged).ok_or_else(|| {
            let bad = match kind {
                TransformKind::Yoy | TransformKind::Mom => lagged,
                TransformKind::Logdiff if current <= 0.0 => current,
                TransformKind::Logdiff => lagged,
                _ => current,
            };
            RotatorError::InvalidValue {
                series: raw.id.clone(),
                date: index.dates()[i],
                value: bad,
            }
        })?;
        out[i] = Some(value);
    }

    Ok(out)
}

/// Normalize one raw series.
pub fn normalize(
    raw: &Series,
    cfg: &SeriesConfig,
    index: &TimeIndex,
    z_window: usize,
    smooth_window: usize,
) -> RotatorResult<NormalizedSeries> {
    let required = cfg.transform.lag() + z_window;
    let available = raw.observed_len();
    if available < required {
        return Err(RotatorError::InsufficientHistory {
            series: cfg.id.clone(),
            required,
            available,
        });
    }

    let transformed = transform(raw, cfg.transform, index)?;
    let sign = cfg.direction.sign();

    let mut window = RollingWindow::new(z_window);
    let mut ema = Ema::new(smooth_window);
    let mut values = vec![None; transformed.len()];

    for (i, x) in transformed.iter().enumerate() {
        let Some(x) = x else { continue };
        let signed = sign * x;
        window.push(signed);
        if let Some(z) = window.zscore(signed) {
            values[i] = ema.update(z);
        }
    }

    let normalized = NormalizedSeries {
        id: cfg.id.clone(),
        values,
    };
    debug!(
        series = %cfg.id,
        first_valid = ?normalized.first_valid(),
        "normalized series"
    );
    Ok(normalized)
}

/// Normalize every series of a group, in parallel across series.
pub fn normalize_group(
    group: &SeriesGroup,
    raw: &SeriesMap,
    index: &TimeIndex,
    z_window: usize,
    smooth_window: usize,
) -> RotatorResult<NormalizedMap> {
    let normalized = group
        .series
        .par_iter()
        .map(|cfg| {
            let series = raw.get(&cfg.id).ok_or_else(|| {
                RotatorError::config(format!(
                    "{} series {} not present in dataset",
                    group.group.as_str(),
                    cfg.id
                ))
            })?;
            normalize(series, cfg, index, z_window, smooth_window)
        })
        .collect::<Vec<_>>();

    // report the first failure in configuration order
    normalized
        .into_iter()
        .map(|n| n.map(|n| (n.id.clone(), n)))
        .collect()
}
