//! Passive baselines over the same price series and accounting window.
//!
//! The buy-and-hold benchmarks run through [`BacktestEngine`] with no
//! transitions and no costs, so they share the strategy's arithmetic exactly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{PriceSeries, TimeIndex};
use crate::error::{RotatorError, RotatorResult};
use crate::metrics::{MetricsCalculator, PerformanceReport, TurnoverStats};
use crate::regime::Regime;
use crate::validation::{price_at, PriceField};

use super::costs::TransactionCostModel;
use super::engine::{BacktestConfig, BacktestEngine};

/// Fixed-weight benchmark settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Target weight of the risk asset; the rest is in the safe asset.
    pub risk_weight: f64,
    /// Bars between rebalances back to target; 0 never rebalances.
    pub rebalance_every: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            risk_weight: 0.6,
            rebalance_every: 12,
        }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> RotatorResult<()> {
        if !(0.0..=1.0).contains(&self.risk_weight) {
            return Err(RotatorError::config(format!(
                "benchmark risk_weight must be in [0, 1], got {}",
                self.risk_weight
            )));
        }
        Ok(())
    }
}

/// The three reference portfolios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSet {
    pub risk_buy_hold: PerformanceReport,
    pub safe_buy_hold: PerformanceReport,
    pub fixed_weight: PerformanceReport,
}

impl BenchmarkSet {
    pub fn summary(&self) -> String {
        let line = |name: &str, r: &PerformanceReport| {
            format!(
                "{:<14} CAGR {:>7.2}%  Vol {:>6.2}%  Sharpe {:>5.2}  MaxDD {:>7.2}%",
                name,
                r.cagr * 100.0,
                r.annualized_volatility * 100.0,
                r.sharpe_ratio,
                r.max_drawdown * 100.0
            )
        };
        [
            line("Risk B&H", &self.risk_buy_hold),
            line("Safe B&H", &self.safe_buy_hold),
            line("Fixed weight", &self.fixed_weight),
        ]
        .join("\n")
    }
}

/// Value path of a fixed-weight portfolio rebalanced every `rebalance_every`
/// bars at the close.
fn fixed_weight_path(
    index: &TimeIndex,
    price_risk: &PriceSeries,
    price_safe: &PriceSeries,
    start: usize,
    initial_value: f64,
    config: &BenchmarkConfig,
) -> RotatorResult<(Vec<NaiveDate>, Vec<f64>)> {
    let close = |prices: &PriceSeries, i: usize| price_at(index, prices, i, PriceField::Close);

    let mut value = initial_value;
    let mut units_risk = value * config.risk_weight / close(price_risk, start)?;
    let mut units_safe = value * (1.0 - config.risk_weight) / close(price_safe, start)?;
    let mut dates = vec![index.dates()[start]];
    let mut values = vec![value];
    let mut rebalances = 0;

    for i in start + 1..index.len() {
        let (risk, safe) = (close(price_risk, i)?, close(price_safe, i)?);
        value = units_risk * risk + units_safe * safe;
        if config.rebalance_every > 0 && (i - start) % config.rebalance_every == 0 {
            units_risk = value * config.risk_weight / risk;
            units_safe = value * (1.0 - config.risk_weight) / safe;
            rebalances += 1;
        }
        dates.push(index.dates()[i]);
        values.push(value);
    }

    debug!("Fixed-weight benchmark rebalanced {} times", rebalances);
    Ok((dates, values))
}

/// Compute the benchmark reports over the accounting window of `backtest`.
pub fn compute_benchmarks(
    index: &TimeIndex,
    price_risk: &PriceSeries,
    price_safe: &PriceSeries,
    backtest: &BacktestConfig,
    config: &BenchmarkConfig,
) -> RotatorResult<BenchmarkSet> {
    config.validate()?;
    let passive = BacktestEngine::new(BacktestConfig {
        costs: TransactionCostModel::zero(),
        ..backtest.clone()
    })?;

    let risk_buy_hold = passive
        .run(index, &[], Regime::RiskOn, price_risk, price_safe)?
        .report;
    let safe_buy_hold = passive
        .run(index, &[], Regime::RiskOff, price_risk, price_safe)?
        .report;

    let start = passive.start_index(index)?;
    let initial_value = f64::try_from(backtest.initial_equity)
        .map_err(|_| RotatorError::config("initial_equity is not representable as f64"))?;
    let (dates, values) = fixed_weight_path(index, price_risk, price_safe, start, initial_value, config)?;
    let fixed_weight = MetricsCalculator::calculate(
        &dates,
        &values,
        backtest.periods_per_year,
        backtest.risk_free_rate,
        TurnoverStats::default(),
    );

    Ok(BenchmarkSet {
        risk_buy_hold,
        safe_buy_hold,
        fixed_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::engine::{run_backtest, RebalanceTiming};

    fn setup() -> (TimeIndex, PriceSeries, PriceSeries) {
        let index = TimeIndex::monthly(2020, 1, 5).unwrap();
        let risk = PriceSeries::from_closes("SPY", &[100.0, 110.0, 99.0, 120.0, 130.0]);
        let safe = PriceSeries::from_closes("TLT", &[50.0, 50.0, 55.0, 55.0, 50.0]);
        (index, risk, safe)
    }

    fn signal_close_config() -> BacktestConfig {
        BacktestConfig {
            rebalance_on: RebalanceTiming::SignalClose,
            costs: TransactionCostModel::zero(),
            ..Default::default()
        }
    }

    #[test]
    fn test_buy_and_hold() {
        let (index, risk, safe) = setup();
        let set = compute_benchmarks(&index, &risk, &safe, &signal_close_config(), &BenchmarkConfig::default()).unwrap();
        assert!((set.risk_buy_hold.cumulative_return - 0.30).abs() < 1e-12);
        assert!(set.safe_buy_hold.cumulative_return.abs() < 1e-12);
        assert!((set.safe_buy_hold.max_drawdown - (50.0 / 55.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_without_signals_equals_risk_buy_and_hold() {
        let (index, risk, safe) = setup();
        let cfg = signal_close_config();
        let strategy = run_backtest(&index, &[], Regime::RiskOn, &risk, &safe, &cfg).unwrap();
        let set = compute_benchmarks(&index, &risk, &safe, &cfg, &BenchmarkConfig::default()).unwrap();
        assert_eq!(strategy.report, set.risk_buy_hold);
    }

    #[test]
    fn test_fixed_weight_rebalancing() {
        let (index, risk, safe) = setup();
        let never = BenchmarkConfig {
            risk_weight: 0.5,
            rebalance_every: 0,
        };
        let (_, values) = fixed_weight_path(&index, &risk, &safe, 0, 100.0, &never).unwrap();
        // 0.5 unit SPY + 1 unit TLT, never rebalanced
        assert!((values[4] - (0.5 * 130.0 + 1.0 * 50.0)).abs() < 1e-9);

        let every = BenchmarkConfig {
            risk_weight: 0.5,
            rebalance_every: 1,
        };
        let (_, values) = fixed_weight_path(&index, &risk, &safe, 0, 100.0, &every).unwrap();
        let mut expected = 100.0;
        for i in 1..5 {
            let r_risk = risk.bars[i].unwrap().close / risk.bars[i - 1].unwrap().close;
            let r_safe = safe.bars[i].unwrap().close / safe.bars[i - 1].unwrap().close;
            expected *= 0.5 * r_risk + 0.5 * r_safe;
            assert!((values[i] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_weight() {
        let cfg = BenchmarkConfig {
            risk_weight: 1.5,
            rebalance_every: 12,
        };
        assert!(cfg.validate().is_err());
    }
}
