//! Error taxonomy for the rotator pipeline.
//!
//! Every variant carries the offending series id and/or date when one exists,
//! so the report envelope can surface them to collaborators.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RotatorError {
    #[error("Insufficient history for {series}: need {required} observations, have {available}")]
    InsufficientHistory {
        series: String,
        required: usize,
        available: usize,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Data gap in {series} at {date}")]
    DataGap { series: String, date: NaiveDate },

    #[error("Composite {group} undefined at {date}")]
    CompositeUndefined { group: String, date: NaiveDate },

    #[error("Invalid value {value} in {series} at {date}")]
    InvalidValue {
        series: String,
        date: NaiveDate,
        value: f64,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RotatorResult<T> = Result<T, RotatorError>;

impl RotatorError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub(crate) fn gap(series: &str, date: NaiveDate) -> Self {
        Self::DataGap {
            series: series.to_string(),
            date,
        }
    }

    /// Stable snake_case name of the taxonomy kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::InvalidConfig(_) => "invalid_config",
            Self::DataGap { .. } => "data_gap",
            Self::CompositeUndefined { .. } => "composite_undefined",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Data(_) | Self::Csv(_) => "data",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// Offending series (or composite group) id, if any.
    pub fn series_id(&self) -> Option<&str> {
        match self {
            Self::InsufficientHistory { series, .. }
            | Self::DataGap { series, .. }
            | Self::InvalidValue { series, .. } => Some(series),
            Self::CompositeUndefined { group, .. } => Some(group),
            _ => None,
        }
    }

    /// Offending timestamp, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::DataGap { date, .. }
            | Self::CompositeUndefined { date, .. }
            | Self::InvalidValue { date, .. } => Some(*date),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_identifiers() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let err = RotatorError::gap("SPY", date);
        assert_eq!(err.kind(), "data_gap");
        assert_eq!(err.series_id(), Some("SPY"));
        assert_eq!(err.date(), Some(date));
        assert!(err.to_string().contains("SPY"));
    }

    #[test]
    fn test_config_error_has_no_identifiers() {
        let err = RotatorError::config("confirm_periods must be >= 1");
        assert_eq!(err.kind(), "invalid_config");
        assert_eq!(err.series_id(), None);
        assert_eq!(err.date(), None);
    }
}
