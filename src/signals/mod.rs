//! Signal construction.
//!
//! Turns raw macro series into decision inputs:
//! - Rolling z-score + EMA normalization per series
//! - Weighted composite indices (leading, coincident)
//! - Iceberg / sinking / recovery event flags
//! - Auxiliary-series filters (euphoria, recovery doubt)

pub mod composite;
pub mod events;
pub mod filters;
pub mod normalizer;
pub mod rolling;

pub use composite::{build_index, Attribution, CompositeIndexSeries};
pub use events::{detect, EventFlags, EventThresholds};
pub use filters::{
    evaluate_filter, evaluate_filters, gate, FilterConfig, FilterContext, FilterGate, FilterResult,
    FilterRole, FilterSpec,
};
pub use normalizer::{normalize, normalize_group, transform, NormalizedMap, NormalizedSeries};
pub use rolling::{Ema, RollingWindow};
