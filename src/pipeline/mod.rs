//! End-to-end pipeline.
//!
//! This module provides:
//! - [`RegimeRotator`]: validated configuration bound to a dataset
//! - The collaborator-facing [`RotatorReport`] and its status envelope

pub mod report;
pub mod rotator;

pub use report::{
    Contribution, CurrentState, Diagnostics, ErrorReport, FilterState, LatestIndices,
    RotatorReport, RunOutcome,
};
pub use rotator::{RegimeRotator, RotatorRun, SignalSet};
