//! Core data types for the rotator.
//!
//! All series are aligned to a single [`TimeIndex`]. Missing observations are
//! explicit `None` markers; nothing in the crate interpolates.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{RotatorError, RotatorResult};

/// Strictly increasing timestamp index shared by every series in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIndex {
    dates: Vec<NaiveDate>,
}

impl TimeIndex {
    /// Build an index, rejecting duplicate or out-of-order dates.
    pub fn new(dates: Vec<NaiveDate>) -> RotatorResult<Self> {
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(RotatorError::gap("index", w[1]));
        }
        Ok(Self { dates })
    }

    /// Monthly index starting at the first day of `year`/`month`.
    pub fn monthly(year: i32, month: u32, periods: usize) -> RotatorResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| RotatorError::Data(format!("invalid start month {}-{}", year, month)))?;
        let dates = (0..periods)
            .map(|i| {
                start
                    .checked_add_months(chrono::Months::new(i as u32))
                    .ok_or_else(|| RotatorError::Data("index date overflow".to_string()))
            })
            .collect::<RotatorResult<Vec<_>>>()?;
        Self::new(dates)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, i: usize) -> Option<NaiveDate> {
        self.dates.get(i).copied()
    }

    /// Position of an exact date in the index.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// First position at or after `date`.
    pub fn position_at_or_after(&self, date: NaiveDate) -> Option<usize> {
        let pos = self.dates.partition_point(|d| *d < date);
        (pos < self.dates.len()).then_some(pos)
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// One named macro series aligned to a [`TimeIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub values: Vec<Option<f64>>,
}

impl Series {
    pub fn new(id: &str, values: Vec<Option<f64>>) -> Self {
        Self {
            id: id.to_string(),
            values,
        }
    }

    /// Fully observed series.
    pub fn from_values(id: &str, values: &[f64]) -> Self {
        Self::new(id, values.iter().map(|v| Some(*v)).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied().flatten()
    }

    /// Position of the first observed value.
    pub fn first_observation(&self) -> Option<usize> {
        self.values.iter().position(|v| v.is_some())
    }

    /// Number of observations from the first observed value to the end.
    pub fn observed_len(&self) -> usize {
        self.first_observation()
            .map(|start| self.values.len() - start)
            .unwrap_or(0)
    }
}

/// Series keyed by id; ordered so iteration is deterministic.
pub type SeriesMap = BTreeMap<String, Series>;

/// Build a [`SeriesMap`] from a list of series.
pub fn series_map(series: Vec<Series>) -> SeriesMap {
    series.into_iter().map(|s| (s.id.clone(), s)).collect()
}

/// Price observation for one period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Opening price of the period, required for open-execution rules.
    pub open: Option<f64>,
    /// Closing (or adjusted closing) price of the period.
    pub close: f64,
}

impl PriceBar {
    pub fn close(close: f64) -> Self {
        Self { open: None, close }
    }

    pub fn open_close(open: f64, close: f64) -> Self {
        Self {
            open: Some(open),
            close,
        }
    }
}

/// Price series of one tradable proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub id: String,
    pub bars: Vec<Option<PriceBar>>,
}

impl PriceSeries {
    pub fn new(id: &str, bars: Vec<Option<PriceBar>>) -> Self {
        Self {
            id: id.to_string(),
            bars,
        }
    }

    /// Close-only series.
    pub fn from_closes(id: &str, closes: &[f64]) -> Self {
        Self::new(id, closes.iter().map(|c| Some(PriceBar::close(*c))).collect())
    }

    /// Series with both opens and closes.
    pub fn from_open_close(id: &str, opens: &[f64], closes: &[f64]) -> Self {
        Self::new(
            id,
            opens
                .iter()
                .zip(closes)
                .map(|(o, c)| Some(PriceBar::open_close(*o, *c)))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn has_opens(&self) -> bool {
        self.bars.iter().flatten().all(|b| b.open.is_some())
    }
}

/// Everything the pipeline consumes from the data-fetching collaborators.
#[derive(Debug, Clone)]
pub struct MacroDataset {
    pub index: TimeIndex,
    pub leading: SeriesMap,
    pub coincident: SeriesMap,
    pub auxiliary: SeriesMap,
    pub price_risk: PriceSeries,
    pub price_safe: PriceSeries,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_index_rejects_out_of_order() {
        let err = TimeIndex::new(vec![d(2020, 1), d(2020, 3), d(2020, 2)]).unwrap_err();
        assert_eq!(err.kind(), "data_gap");
        assert_eq!(err.date(), Some(d(2020, 2)));

        assert!(TimeIndex::new(vec![d(2020, 1), d(2020, 1)]).is_err());
    }

    #[test]
    fn test_monthly_index() {
        let index = TimeIndex::monthly(2019, 11, 4).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.last(), Some(d(2020, 2)));
        assert_eq!(index.position(d(2020, 1)), Some(2));
        assert_eq!(index.position_at_or_after(NaiveDate::from_ymd_opt(2019, 12, 15).unwrap()), Some(2));
        assert_eq!(index.position_at_or_after(d(2021, 1)), None);
    }

    #[test]
    fn test_series_observed_len() {
        let s = Series::new("PERMIT", vec![None, None, Some(1.0), Some(2.0)]);
        assert_eq!(s.first_observation(), Some(2));
        assert_eq!(s.observed_len(), 2);
        assert_eq!(s.get(0), None);
        assert_eq!(s.get(3), Some(2.0));
    }

    #[test]
    fn test_price_series_opens() {
        let closes = PriceSeries::from_closes("SPY", &[1.0, 2.0]);
        assert!(!closes.has_opens());
        let full = PriceSeries::from_open_close("SPY", &[1.0, 2.0], &[1.5, 2.5]);
        assert!(full.has_opens());
    }
}
