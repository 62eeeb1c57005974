//! End-to-end rotator run.
//!
//! Runs the pipeline over one bound dataset:
//! 1. Check that every configured series exists in the dataset
//! 2. Normalize both indicator groups (parallel across series)
//! 3. Build the leading and coincident composites
//! 4. Evaluate the auxiliary filters
//! 5. Step the regime machine through time
//! 6. Replay the transitions in the accountant and score the benchmarks

use tracing::{info, warn};

use crate::backtest::{compute_benchmarks, BacktestEngine, BacktestResult, BenchmarkSet};
use crate::config::{RotatorConfig, SeriesGroup};
use crate::data::{MacroDataset, SeriesMap};
use crate::error::{RotatorError, RotatorResult};
use crate::regime::{IndexReading, RegimeMachine, RegimeParams, RegimeRun, StepInput};
use crate::signals::{
    build_index, detect, evaluate_filters, gate, normalize_group, CompositeIndexSeries,
    EventThresholds, FilterContext, FilterResult, FilterRole, NormalizedMap,
};

use super::report::{RotatorReport, RunOutcome};

/// Threshold-independent signals of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSet {
    pub normalized_leading: NormalizedMap,
    pub normalized_coincident: NormalizedMap,
    pub leading: CompositeIndexSeries,
    pub coincident: CompositeIndexSeries,
    pub filters: Vec<FilterResult>,
}

impl SignalSet {
    /// First position where both composites are defined.
    pub fn first_decision(&self) -> Option<usize> {
        (0..self.leading.len()).find(|&i| self.leading.get(i).is_some() && self.coincident.get(i).is_some())
    }

    /// Machine inputs for every bar of `data`'s index.
    pub fn step_inputs(&self, data: &MacroDataset, thresholds: &EventThresholds) -> Vec<StepInput> {
        data.index
            .dates()
            .iter()
            .enumerate()
            .map(|(i, &date)| {
                let reading = match (self.leading.get(i), self.coincident.get(i)) {
                    (Some(leading), Some(coincident)) => {
                        let leading_prev = i.checked_sub(1).and_then(|p| self.leading.get(p));
                        Some(IndexReading {
                            leading,
                            coincident,
                            d_coincident: self.coincident.delta(i).unwrap_or(0.0),
                            flags: detect(leading, leading_prev, coincident, thresholds),
                        })
                    }
                    _ => None,
                };
                StepInput {
                    date,
                    reading,
                    euphoria: gate(&self.filters, FilterRole::Euphoria, i),
                    recovery_doubt: gate(&self.filters, FilterRole::RecoveryDoubt, i),
                }
            })
            .collect()
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RotatorRun {
    pub signals: SignalSet,
    pub inputs: Vec<StepInput>,
    pub regime: RegimeRun,
    pub backtest: BacktestResult,
    pub benchmarks: BenchmarkSet,
}

/// Validated rotator, ready to run against datasets.
pub struct RegimeRotator {
    config: RotatorConfig,
    leading: SeriesGroup,
    coincident: SeriesGroup,
    machine: RegimeMachine,
    engine: BacktestEngine,
}

fn bind_group(group: &SeriesGroup, data: &SeriesMap) -> RotatorResult<()> {
    for id in group.ids() {
        if !data.contains_key(id) {
            return Err(RotatorError::config(format!(
                "{} weight references undefined series {}",
                group.group.as_str(),
                id
            )));
        }
    }
    Ok(())
}

impl RegimeRotator {
    /// Validate `config` and build the rotator.
    pub fn new(config: RotatorConfig) -> RotatorResult<Self> {
        config.validate()?;
        let leading = config.leading_group()?;
        let coincident = config.coincident_group()?;
        let machine = RegimeMachine::new(RegimeParams::from_config(&config))?;
        let engine = BacktestEngine::new(config.backtest.clone())?;
        Ok(Self {
            config,
            leading,
            coincident,
            machine,
            engine,
        })
    }

    pub fn config(&self) -> &RotatorConfig {
        &self.config
    }

    /// Reject datasets that lack a configured series, before any computation.
    pub fn bind(&self, data: &MacroDataset) -> RotatorResult<()> {
        bind_group(&self.leading, &data.leading)?;
        bind_group(&self.coincident, &data.coincident)?;
        for filter in &self.config.filters {
            if let Some(id) = filter.spec.aux_series() {
                if !data.auxiliary.contains_key(id) {
                    return Err(RotatorError::config(format!(
                        "filter {} references undefined series {}",
                        filter.id(),
                        id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Normalization, composites and filters. These do not depend on the
    /// regime thresholds, so a parameter sweep computes them once.
    pub fn compute_signals(&self, data: &MacroDataset) -> RotatorResult<SignalSet> {
        self.bind(data)?;
        let (z, s) = (self.config.z_window, self.config.smooth_window);

        let normalized_leading = normalize_group(&self.leading, &data.leading, &data.index, z, s)?;
        let normalized_coincident = normalize_group(&self.coincident, &data.coincident, &data.index, z, s)?;
        let leading = build_index(&self.leading, &normalized_leading)?;
        let coincident = build_index(&self.coincident, &normalized_coincident)?;

        for composite in [&leading, &coincident] {
            if composite.first_valid().is_none() {
                warn!(
                    "{} composite is never defined over {} bars; no transition can fire",
                    composite.group.as_str(),
                    data.index.len()
                );
            }
        }

        let ctx = FilterContext {
            index: &data.index,
            auxiliary: &data.auxiliary,
            leading: &leading,
        };
        let filters = evaluate_filters(&self.config.filters, &ctx)?;

        Ok(SignalSet {
            normalized_leading,
            normalized_coincident,
            leading,
            coincident,
            filters,
        })
    }

    /// Run the full pipeline.
    pub fn run(&self, data: &MacroDataset) -> RotatorResult<RotatorRun> {
        let signals = self.compute_signals(data)?;
        let inputs = signals.step_inputs(data, &self.machine.params().thresholds);
        let regime = self.machine.run(&inputs);

        let backtest = self.engine.run(
            &data.index,
            &regime.transitions,
            self.config.initial_state,
            &data.price_risk,
            &data.price_safe,
        )?;
        let benchmarks = compute_benchmarks(
            &data.index,
            &data.price_risk,
            &data.price_safe,
            &self.config.backtest,
            &self.config.benchmark,
        )?;

        info!(
            "Rotator run complete: first decision at {:?}, {} transitions",
            signals.first_decision().and_then(|i| data.index.date(i)),
            regime.transitions.len()
        );

        Ok(RotatorRun {
            signals,
            inputs,
            regime,
            backtest,
            benchmarks,
        })
    }

    /// Run and build the collaborator-facing report.
    pub fn report(&self, data: &MacroDataset) -> RotatorResult<RotatorReport> {
        let run = self.run(data)?;
        Ok(RotatorReport::from_run(&run, data, &self.config))
    }

    /// Run and wrap the result, or the failure, in the status envelope.
    pub fn evaluate(&self, data: &MacroDataset) -> RunOutcome {
        self.report(data).into()
    }
}
