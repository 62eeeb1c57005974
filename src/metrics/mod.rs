//! Performance metrics module.
//!
//! Provides performance calculations over a portfolio value path:
//! - Cumulative return, CAGR
//! - Annualized volatility, Sharpe ratio, Sortino ratio, Calmar ratio
//! - Maximum drawdown
//! - Turnover and cost drag

pub mod calculator;

pub use calculator::{DrawdownAnalysis, MetricsCalculator, PerformanceReport, TurnoverStats};
