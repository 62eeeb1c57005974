//! Backtesting of the regime allocation path.
//!
//! This module provides:
//! - Switch cost modeling (commission + slippage, in bps)
//! - The portfolio accountant with delayed, look-ahead-free execution
//! - Buy-and-hold and fixed-weight benchmarks

pub mod benchmark;
pub mod costs;
pub mod engine;

pub use benchmark::{compute_benchmarks, BenchmarkConfig, BenchmarkSet};
pub use costs::{SwitchCost, TransactionCostModel};
pub use engine::{
    run_backtest, BacktestConfig, BacktestEngine, BacktestResult, Execution, PortfolioState,
    PriceColumns, RebalanceTiming,
};
