//! Parameter sweep over the regime thresholds.

pub mod optimizer;

pub use optimizer::{sweep, ParameterGrid, ParameterSet, SweepResult, SweepSummary};
