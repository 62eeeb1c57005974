pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod regime;
pub mod signals;
pub mod sweep;
pub mod validation;

// Re-export commonly used types
pub use backtest::{
    run_backtest, BacktestConfig, BacktestResult, BenchmarkSet, RebalanceTiming, TransactionCostModel,
};
pub use config::{Direction, RotatorConfig, SeriesConfig, TransformKind, WeightPolicy};
pub use data::{load_csv, MacroDataset, PriceSeries, Series, TimeIndex};
pub use error::{RotatorError, RotatorResult};
pub use metrics::{MetricsCalculator, PerformanceReport};
pub use pipeline::{RegimeRotator, RotatorReport, RunOutcome};
pub use regime::{Regime, RegimeMachine, RegimeState, TransitionEvent};
pub use signals::{CompositeIndexSeries, FilterConfig, FilterSpec};
pub use sweep::{sweep, ParameterGrid, SweepResult};
