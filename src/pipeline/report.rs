//! Collaborator-facing result structure.
//!
//! [`RunOutcome`] serializes with a `status` tag (`ok` / `error`); an error
//! carries the taxonomy kind and the offending identifiers, never a partial
//! report.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::backtest::{BenchmarkSet, Execution};
use crate::config::RotatorConfig;
use crate::data::MacroDataset;
use crate::error::{RotatorError, RotatorResult};
use crate::metrics::PerformanceReport;
use crate::regime::{Regime, RegimeStats, TransitionEvent};
use crate::signals::{CompositeIndexSeries, FilterRole};

use super::rotator::RotatorRun;

const TOP_N: usize = 3;

/// Regime held at the end of the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub state: Regime,
    pub since: NaiveDate,
    pub months_in_state: u32,
}

/// Latest composite readings and distances to the thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestIndices {
    pub date: NaiveDate,
    pub leading: f64,
    pub coincident: f64,
    pub d_leading: f64,
    pub d_coincident: f64,
    pub iceberg_event: bool,
    pub sinking_event: bool,
    pub recovery_candidate: bool,
    /// `leading - iceberg_threshold`; negative once breached.
    pub distance_to_iceberg: f64,
    /// `coincident - sinking_threshold`; negative once breached.
    pub distance_to_sinking: f64,
}

/// Weighted contribution of one constituent to its composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub group: String,
    pub id: String,
    pub weight: f64,
    pub contribution: f64,
}

/// Activation of one filter at the report date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub id: String,
    pub role: FilterRole,
    /// `None` while the filter warms up.
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub date: Option<NaiveDate>,
    pub contributions: Vec<Contribution>,
    pub top_contributors: Vec<Contribution>,
    pub top_detractors: Vec<Contribution>,
    pub filters: Vec<FilterState>,
    pub regime_stats: Vec<RegimeStats>,
}

/// Full report of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatorReport {
    pub current_state: Option<CurrentState>,
    pub latest_indices: Option<LatestIndices>,
    pub switch_events: Vec<TransitionEvent>,
    pub executions: Vec<Execution>,
    pub pending_signals: Vec<TransitionEvent>,
    pub backtest_summary: PerformanceReport,
    pub benchmarks: BenchmarkSet,
    pub diagnostics: Diagnostics,
}

/// Whole calendar months between two dates.
fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    months.max(0) as u32
}

fn contributions(composite: &CompositeIndexSeries, i: usize) -> Vec<Contribution> {
    let group = composite.group.as_str();
    composite
        .attribution
        .iter()
        .filter_map(|a| {
            let contribution = a.contributions.get(i).copied().flatten()?;
            Some(Contribution {
                group: group.to_string(),
                id: a.id.clone(),
                weight: a.weight,
                contribution,
            })
        })
        .collect()
}

impl RotatorReport {
    pub fn from_run(run: &RotatorRun, data: &MacroDataset, config: &RotatorConfig) -> Self {
        let current_state = match (run.regime.final_state(), data.index.last()) {
            (Some(state), Some(last)) => Some(CurrentState {
                state: state.regime,
                since: state.since,
                months_in_state: months_between(state.since, last),
            }),
            _ => None,
        };

        let latest = run.inputs.iter().enumerate().rev().find_map(|(i, input)| {
            input.reading.map(|reading| (i, input.date, reading))
        });
        let latest_indices = latest.map(|(_, date, r)| LatestIndices {
            date,
            leading: r.leading,
            coincident: r.coincident,
            d_leading: r.flags.d_leading,
            d_coincident: r.d_coincident,
            iceberg_event: r.flags.iceberg,
            sinking_event: r.flags.sinking,
            recovery_candidate: r.flags.recovery_candidate,
            distance_to_iceberg: r.leading - config.iceberg_threshold,
            distance_to_sinking: r.coincident - config.sinking_threshold,
        });

        let diagnostics = Self::diagnostics(run, latest.map(|(i, date, _)| (i, date)));

        Self {
            current_state,
            latest_indices,
            switch_events: run.regime.transitions.clone(),
            executions: run.backtest.executions.clone(),
            pending_signals: run.backtest.pending_signals.clone(),
            backtest_summary: run.backtest.report.clone(),
            benchmarks: run.benchmarks.clone(),
            diagnostics,
        }
    }

    fn diagnostics(run: &RotatorRun, at: Option<(usize, NaiveDate)>) -> Diagnostics {
        let mut regime_stats: Vec<RegimeStats> = run.regime.stats().into_values().collect();
        regime_stats.sort_by_key(|s| s.regime != Regime::RiskOn);

        let Some((i, date)) = at else {
            return Diagnostics {
                date: None,
                contributions: Vec::new(),
                top_contributors: Vec::new(),
                top_detractors: Vec::new(),
                filters: Vec::new(),
                regime_stats,
            };
        };

        let mut all = contributions(&run.signals.leading, i);
        all.extend(contributions(&run.signals.coincident, i));

        let mut ranked = all.clone();
        ranked.sort_by(|a, b| b.contribution.total_cmp(&a.contribution).then_with(|| a.id.cmp(&b.id)));
        let top_contributors = ranked.iter().filter(|c| c.contribution > 0.0).take(TOP_N).cloned().collect();
        let top_detractors = ranked.iter().rev().filter(|c| c.contribution < 0.0).take(TOP_N).cloned().collect();

        let filters = run
            .signals
            .filters
            .iter()
            .map(|f| FilterState {
                id: f.id.clone(),
                role: f.role,
                active: f.get(i),
            })
            .collect();

        Diagnostics {
            date: Some(date),
            contributions: all,
            top_contributors,
            top_detractors,
            filters,
            regime_stats,
        }
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let mut out = String::new();

        match &self.current_state {
            Some(s) => out.push_str(&format!(
                "Regime: {} since {} ({} months)\n  {}\n",
                s.state.as_str(),
                s.since,
                s.months_in_state,
                s.state.description()
            )),
            None => out.push_str("Regime: n/a (empty input)\n"),
        }

        if let Some(l) = &self.latest_indices {
            out.push_str(&format!(
                "\nIndices at {}\n\
                 ----------------------------------------\n\
                 Leading: {:.3} (dL {:+.3}, {:+.3} to iceberg){}\n\
                 Coincident: {:.3} (dC {:+.3}, {:+.3} to sinking){}\n",
                l.date,
                l.leading,
                l.d_leading,
                l.distance_to_iceberg,
                if l.iceberg_event { " ICEBERG" } else { "" },
                l.coincident,
                l.d_coincident,
                l.distance_to_sinking,
                if l.sinking_event { " SINKING" } else { "" },
            ));
        }

        out.push_str(&format!("\nSwitch events: {}\n", self.switch_events.len()));
        for event in &self.switch_events {
            out.push_str(&format!(
                "  {} {} -> {} (leading {:.3}, streak {})\n",
                event.date,
                event.from_state.as_str(),
                event.to_state.as_str(),
                event.reason.leading,
                event.reason.streak
            ));
        }

        out.push_str("\nStrategy\n----------------------------------------\n");
        out.push_str(&self.backtest_summary.summary());
        out.push_str("\n\nBenchmarks\n----------------------------------------\n");
        out.push_str(&self.benchmarks.summary());

        if !self.diagnostics.top_contributors.is_empty() || !self.diagnostics.top_detractors.is_empty() {
            out.push_str("\n\nDrivers\n----------------------------------------\n");
            for c in &self.diagnostics.top_contributors {
                out.push_str(&format!("  + {:<10} {:+.3} ({})\n", c.id, c.contribution, c.group));
            }
            for c in &self.diagnostics.top_detractors {
                out.push_str(&format!("  - {:<10} {:+.3} ({})\n", c.id, c.contribution, c.group));
            }
        }
        out
    }
}

/// Structured failure for the status envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub series_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub message: String,
}

impl From<&RotatorError> for ErrorReport {
    fn from(err: &RotatorError) -> Self {
        Self {
            kind: err.kind().to_string(),
            series_id: err.series_id().map(str::to_string),
            date: err.date(),
            message: err.to_string(),
        }
    }
}

/// Status envelope around a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Ok(Box<RotatorReport>),
    Error(ErrorReport),
}

impl RunOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl From<RotatorResult<RotatorReport>> for RunOutcome {
    fn from(result: RotatorResult<RotatorReport>) -> Self {
        match result {
            Ok(report) => Self::Ok(Box::new(report)),
            Err(err) => Self::Error(ErrorReport::from(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between(d(2020, 11), d(2021, 2)), 3);
        assert_eq!(months_between(d(2020, 3), d(2020, 3)), 0);
        assert_eq!(months_between(d(2021, 3), d(2020, 3)), 0);
    }

    #[test]
    fn test_error_envelope() {
        let err = RotatorError::gap("TLT", d(2008, 10));
        let result: RotatorResult<RotatorReport> = Err(err);
        let outcome = RunOutcome::from(result);
        assert!(!outcome.is_ok());

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "data_gap");
        assert_eq!(json["series_id"], "TLT");
        assert_eq!(json["date"], "2008-10-01");
    }
}
