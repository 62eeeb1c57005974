//! Input validation for aligned series.
//!
//! The core never reorders, fills or interpolates: anything misaligned is a
//! fatal `DataGap` carrying the series id and date.

pub mod alignment;

pub use alignment::{check_prices, check_series, price_at, PriceField};
