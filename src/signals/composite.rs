//! Composite index builder.
//!
//! `index[t] = Σ weight_i · normalized_i[t]`, defined only when every
//! constituent is valid at `t`. Per-series contributions are kept for
//! diagnostics.

use chrono::NaiveDate;

use crate::config::{IndicatorGroup, SeriesGroup};
use crate::error::{RotatorError, RotatorResult};

use super::normalizer::NormalizedMap;

/// Contribution path of one constituent.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub id: String,
    pub weight: f64,
    pub contributions: Vec<Option<f64>>,
}

/// One composite index (leading or coincident) aligned to the run's index.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeIndexSeries {
    pub group: IndicatorGroup,
    pub values: Vec<Option<f64>>,
    pub attribution: Vec<Attribution>,
}

impl CompositeIndexSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied().flatten()
    }

    /// Value at `i`, or `CompositeUndefined` during warm-up.
    pub fn value_at(&self, i: usize, date: NaiveDate) -> RotatorResult<f64> {
        self.get(i).ok_or_else(|| RotatorError::CompositeUndefined {
            group: self.group.as_str().to_string(),
            date,
        })
    }

    /// First difference at `i`. Neutral (0) when there is no valid previous value.
    pub fn delta(&self, i: usize) -> Option<f64> {
        let current = self.get(i)?;
        let prev = i.checked_sub(1).and_then(|p| self.get(p));
        Some(prev.map(|p| current - p).unwrap_or(0.0))
    }

    pub fn first_valid(&self) -> Option<usize> {
        self.values.iter().position(|v| v.is_some())
    }

    /// Per-series contributions at `i`, in configuration order.
    pub fn contributions_at(&self, i: usize) -> Vec<(String, f64)> {
        self.attribution
            .iter()
            .filter_map(|a| {
                a.contributions
                    .get(i)
                    .copied()
                    .flatten()
                    .map(|c| (a.id.clone(), c))
            })
            .collect()
    }
}

/// Combine a group's normalized series into a composite index.
pub fn build_index(
    group: &SeriesGroup,
    normalized: &NormalizedMap,
) -> RotatorResult<CompositeIndexSeries> {
    let mut attribution = Vec::with_capacity(group.series.len());
    let mut len: Option<usize> = None;

    for cfg in &group.series {
        let series = normalized.get(&cfg.id).ok_or_else(|| {
            RotatorError::config(format!(
                "{} weight references undefined series {}",
                group.group.as_str(),
                cfg.id
            ))
        })?;
        match len {
            None => len = Some(series.values.len()),
            Some(l) if l != series.values.len() => {
                return Err(RotatorError::Data(format!(
                    "{} has {} values, expected {}",
                    cfg.id,
                    series.values.len(),
                    l
                )))
            }
            Some(_) => {}
        }
        attribution.push(Attribution {
            id: cfg.id.clone(),
            weight: cfg.weight,
            contributions: series.values.iter().map(|v| v.map(|x| cfg.weight * x)).collect(),
        });
    }

    let len = len.unwrap_or(0);
    let values = (0..len)
        .map(|t| {
            attribution
                .iter()
                .map(|a| a.contributions[t])
                .sum::<Option<f64>>()
        })
        .collect();

    Ok(CompositeIndexSeries {
        group: group.group,
        values,
        attribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Direction, SeriesConfig, TransformKind, WeightPolicy};
    use crate::signals::NormalizedSeries;

    fn group(weights: &[(&str, f64)]) -> SeriesGroup {
        let configs: Vec<_> = weights
            .iter()
            .map(|(id, w)| SeriesConfig::new(id, TransformKind::Level, Direction::Positive, *w))
            .collect();
        SeriesGroup::new(IndicatorGroup::Leading, &configs, WeightPolicy::Strict).unwrap()
    }

    fn normalized(id: &str, values: Vec<Option<f64>>) -> (String, NormalizedSeries) {
        (
            id.to_string(),
            NormalizedSeries {
                id: id.to_string(),
                values,
            },
        )
    }

    #[test]
    fn test_weighted_sum() {
        let g = group(&[("A", 0.25), ("B", 0.75)]);
        let map: NormalizedMap = [
            normalized("A", vec![Some(1.0), Some(-2.0)]),
            normalized("B", vec![Some(2.0), Some(0.0)]),
        ]
        .into_iter()
        .collect();
        let index = build_index(&g, &map).unwrap();
        assert_eq!(index.values, vec![Some(1.75), Some(-0.5)]);
        assert_eq!(
            index.contributions_at(1),
            vec![("A".to_string(), -0.5), ("B".to_string(), 0.0)]
        );
    }

    #[test]
    fn test_undefined_until_all_constituents_valid() {
        let g = group(&[("A", 0.5), ("B", 0.5)]);
        let map: NormalizedMap = [
            normalized("A", vec![Some(1.0), Some(1.0), Some(1.0)]),
            normalized("B", vec![None, None, Some(3.0)]),
        ]
        .into_iter()
        .collect();
        let index = build_index(&g, &map).unwrap();
        assert_eq!(index.values, vec![None, None, Some(2.0)]);
        assert_eq!(index.first_valid(), Some(2));
        // attribution still reports the valid constituent
        assert_eq!(index.contributions_at(0), vec![("A".to_string(), 0.5)]);

        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let err = index.value_at(0, date).unwrap_err();
        assert_eq!(err.kind(), "composite_undefined");
        assert_eq!(err.series_id(), Some("leading"));
    }

    #[test]
    fn test_delta_is_neutral_at_first_valid() {
        let g = group(&[("A", 1.0)]);
        let map: NormalizedMap = [normalized("A", vec![None, Some(0.2), Some(-0.4)])]
            .into_iter()
            .collect();
        let index = build_index(&g, &map).unwrap();
        assert_eq!(index.delta(0), None);
        assert_eq!(index.delta(1), Some(0.0));
        assert!((index.delta(2).unwrap() + 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_series_reference_rejected() {
        let g = group(&[("A", 1.0)]);
        let err = build_index(&g, &NormalizedMap::new()).unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }
}
