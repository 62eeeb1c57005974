//! Alignment and continuity checks for pipeline inputs.
//!
//! Validates:
//! - Series length matches the shared index
//! - No interior gaps (a `None` after the first observation)
//! - All observed values are finite
//! - Price bars exist and are positive wherever the accountant needs them

use serde::{Deserialize, Serialize};

use crate::data::{PriceSeries, Series, TimeIndex};
use crate::error::{RotatorError, RotatorResult};

/// Which part of a price bar a check requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    Close,
}

fn check_length(index: &TimeIndex, id: &str, len: usize) -> RotatorResult<()> {
    if len == index.len() {
        return Ok(());
    }
    // First date the series fails to cover, or the last index date if it overruns.
    let at = len.min(index.len().saturating_sub(1));
    let date = index
        .date(at)
        .ok_or_else(|| RotatorError::Data(format!("empty index while checking {}", id)))?;
    Err(RotatorError::gap(id, date))
}

/// Check a macro series against the index. Returns the position of its first
/// observation, or `None` if it has no observations at all.
pub fn check_series(index: &TimeIndex, series: &Series) -> RotatorResult<Option<usize>> {
    check_length(index, &series.id, series.len())?;

    let Some(start) = series.first_observation() else {
        return Ok(None);
    };

    for (i, value) in series.values.iter().enumerate().skip(start) {
        let date = index.dates()[i];
        match value {
            None => return Err(RotatorError::gap(&series.id, date)),
            Some(v) if !v.is_finite() => {
                return Err(RotatorError::InvalidValue {
                    series: series.id.clone(),
                    date,
                    value: *v,
                })
            }
            Some(_) => {}
        }
    }

    Ok(Some(start))
}

/// Read one field of a price bar, failing with the offending date and id.
pub fn price_at(
    index: &TimeIndex,
    prices: &PriceSeries,
    i: usize,
    field: PriceField,
) -> RotatorResult<f64> {
    let date = index
        .date(i)
        .ok_or_else(|| RotatorError::Data(format!("{} read past end of index", prices.id)))?;
    let bar = prices
        .bars
        .get(i)
        .copied()
        .flatten()
        .ok_or_else(|| RotatorError::gap(&prices.id, date))?;
    let value = match field {
        PriceField::Close => bar.close,
        PriceField::Open => bar.open.ok_or_else(|| RotatorError::gap(&prices.id, date))?,
    };
    if !value.is_finite() || value <= 0.0 {
        return Err(RotatorError::InvalidValue {
            series: prices.id.clone(),
            date,
            value,
        });
    }
    Ok(value)
}

/// Check that closes exist from `from` to the end of the index.
pub fn check_prices(index: &TimeIndex, prices: &PriceSeries, from: usize) -> RotatorResult<()> {
    check_length(index, &prices.id, prices.len())?;
    for i in from..index.len() {
        price_at(index, prices, i, PriceField::Close)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;
    use chrono::NaiveDate;

    fn index(n: usize) -> TimeIndex {
        TimeIndex::monthly(2020, 1, n).unwrap()
    }

    #[test]
    fn test_leading_missing_prefix_is_allowed() {
        let s = Series::new("PERMIT", vec![None, None, Some(1.0), Some(2.0)]);
        assert_eq!(check_series(&index(4), &s).unwrap(), Some(2));
    }

    #[test]
    fn test_interior_gap_is_fatal() {
        let s = Series::new("PERMIT", vec![Some(1.0), None, Some(2.0)]);
        let err = check_series(&index(3), &s).unwrap_err();
        assert_eq!(err.kind(), "data_gap");
        assert_eq!(err.series_id(), Some("PERMIT"));
        assert_eq!(err.date(), NaiveDate::from_ymd_opt(2020, 2, 1));
    }

    #[test]
    fn test_length_mismatch_is_gap() {
        let s = Series::from_values("ICSA", &[1.0, 2.0]);
        let err = check_series(&index(3), &s).unwrap_err();
        assert_eq!(err.date(), NaiveDate::from_ymd_opt(2020, 3, 1));
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let s = Series::from_values("ICSA", &[1.0, f64::NAN]);
        assert_eq!(check_series(&index(2), &s).unwrap_err().kind(), "invalid_value");
    }

    #[test]
    fn test_price_checks() {
        let idx = index(3);
        let prices = PriceSeries::new(
            "TLT",
            vec![Some(PriceBar::close(100.0)), None, Some(PriceBar::close(101.0))],
        );
        assert!(check_prices(&idx, &prices, 2).is_ok());
        let err = check_prices(&idx, &prices, 0).unwrap_err();
        assert_eq!(err.series_id(), Some("TLT"));

        assert!(price_at(&idx, &prices, 0, PriceField::Open).is_err());
        assert_eq!(price_at(&idx, &prices, 2, PriceField::Close).unwrap(), 101.0);
    }
}
