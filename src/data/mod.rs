//! Data layer for the rotator.
//!
//! This module provides:
//! - Aligned series types (`TimeIndex`, `Series`, `PriceSeries`, `MacroDataset`)
//! - A CSV loader that assigns columns to indicator and price groups

pub mod loader;
pub mod types;

pub use loader::{load_csv, parse_csv};
pub use types::{
    series_map, MacroDataset, PriceBar, PriceSeries, Series, SeriesMap, TimeIndex,
};
