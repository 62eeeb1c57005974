//! Grid search over the regime parameters.
//!
//! Normalization, composites and filters do not depend on the regime
//! thresholds, so they are computed once; each grid point re-runs only the
//! state machine and the accountant, in parallel with rayon.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::BacktestEngine;
use crate::config::RotatorConfig;
use crate::data::MacroDataset;
use crate::error::RotatorResult;
use crate::metrics::PerformanceReport;
use crate::pipeline::RegimeRotator;
use crate::regime::{RegimeMachine, RegimeParams};

/// Parameter values to sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterGrid {
    /// Iceberg threshold values.
    pub iceberg_threshold: Vec<f64>,
    /// Hysteresis values.
    pub hysteresis: Vec<f64>,
    /// Confirmation period values.
    pub confirm_periods: Vec<u32>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            iceberg_threshold: vec![-0.5, -0.3, -0.1],
            hysteresis: vec![0.0, 0.15, 0.3],
            confirm_periods: vec![1, 2, 3],
        }
    }
}

impl ParameterGrid {
    /// Calculate total number of parameter combinations.
    pub fn total_combinations(&self) -> usize {
        self.iceberg_threshold.len() * self.hysteresis.len() * self.confirm_periods.len()
    }

    /// Generate all parameter combinations, in grid order.
    pub fn combinations(&self) -> Vec<ParameterSet> {
        let mut combos = Vec::with_capacity(self.total_combinations());
        for &iceberg_threshold in &self.iceberg_threshold {
            for &hysteresis in &self.hysteresis {
                for &confirm_periods in &self.confirm_periods {
                    combos.push(ParameterSet {
                        iceberg_threshold,
                        hysteresis,
                        confirm_periods,
                    });
                }
            }
        }
        combos
    }
}

/// A single parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub iceberg_threshold: f64,
    pub hysteresis: f64,
    pub confirm_periods: u32,
}

impl ParameterSet {
    /// Apply this parameter set to a rotator config.
    pub fn apply_to_config(&self, config: &mut RotatorConfig) {
        config.iceberg_threshold = self.iceberg_threshold;
        config.hysteresis = self.hysteresis;
        config.confirm_periods = self.confirm_periods;
    }

    /// Create a unique key for this parameter set.
    pub fn key(&self) -> String {
        format!(
            "ice{:.2}_hys{:.2}_conf{}",
            self.iceberg_threshold, self.hysteresis, self.confirm_periods
        )
    }
}

/// Performance of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub params: ParameterSet,
    pub cagr: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub turnover_count: usize,
    pub cost_drag: f64,
    pub final_value: f64,
}

impl SweepSummary {
    fn new(params: ParameterSet, report: &PerformanceReport) -> Self {
        Self {
            params,
            cagr: report.cagr,
            sharpe_ratio: report.sharpe_ratio,
            max_drawdown: report.max_drawdown,
            turnover_count: report.turnover_count,
            cost_drag: report.cost_drag,
            final_value: report.final_value,
        }
    }
}

/// Grid points ranked by Sharpe ratio (ties keep grid order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub results: Vec<SweepSummary>,
}

impl SweepResult {
    pub fn best(&self) -> Option<&SweepSummary> {
        self.results.first()
    }

    /// Get summary string for the `top` best grid points.
    pub fn summary(&self, top: usize) -> String {
        let mut out = format!(
            "Parameter Sweep: {} combinations\n\
             ----------------------------------------\n",
            self.results.len()
        );
        for (rank, r) in self.results.iter().take(top).enumerate() {
            out.push_str(&format!(
                "{:>3}. {:<26} Sharpe {:>5.2}  CAGR {:>6.2}%  MaxDD {:>7.2}%  Switches {}\n",
                rank + 1,
                r.params.key(),
                r.sharpe_ratio,
                r.cagr * 100.0,
                r.max_drawdown * 100.0,
                r.turnover_count
            ));
        }
        out
    }
}

/// Run every grid point against `data`. Every combination is validated before
/// any computation starts.
pub fn sweep(config: &RotatorConfig, grid: &ParameterGrid, data: &MacroDataset) -> RotatorResult<SweepResult> {
    let combos = grid.combinations();
    let mut machines = Vec::with_capacity(combos.len());
    for params in &combos {
        let mut point = config.clone();
        params.apply_to_config(&mut point);
        point.validate_regime_params()?;
        machines.push(RegimeMachine::new(RegimeParams::from_config(&point))?);
    }

    let rotator = RegimeRotator::new(config.clone())?;
    let engine = BacktestEngine::new(config.backtest.clone())?;
    let signals = rotator.compute_signals(data)?;
    info!("Parameter combinations: {}", combos.len());

    let progress = AtomicUsize::new(0);
    let total = combos.len();
    let results = combos
        .par_iter()
        .zip(machines.par_iter())
        .map(|(params, machine)| {
            let inputs = signals.step_inputs(data, &machine.params().thresholds);
            let run = machine.run(&inputs);
            let result = engine.run(
                &data.index,
                &run.transitions,
                config.initial_state,
                &data.price_risk,
                &data.price_safe,
            )?;

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if done % (total / 10).max(1) == 0 || done == total {
                info!("  Sweep: {:.0}% ({}/{} combinations)", done as f64 / total as f64 * 100.0, done, total);
            }
            Ok(SweepSummary::new(*params, &result.report))
        })
        .collect::<Vec<RotatorResult<SweepSummary>>>();

    let mut results = results.into_iter().collect::<RotatorResult<Vec<_>>>()?;
    results.sort_by(|a, b| b.sharpe_ratio.total_cmp(&a.sharpe_ratio));

    if let Some(best) = results.first() {
        info!("Best parameters: {} (Sharpe {:.2})", best.params.key(), best.sharpe_ratio);
    }
    Ok(SweepResult { results })
}
