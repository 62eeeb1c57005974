//! Portfolio accountant.
//!
//! Replays the regime transitions against the two price series:
//! 1. Map each transition to its execution bar (delayed per `rebalance_on`)
//! 2. Absorb executions at or before the start bar into the initial holding
//! 3. Compound the held asset's return bar by bar
//! 4. On an execution bar, charge the switch cost once and change asset
//! 5. Score the value path with [`MetricsCalculator`]
//!
//! Missing prices at any bar the accountant reads are a fatal `DataGap`.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{PriceSeries, TimeIndex};
use crate::error::{RotatorError, RotatorResult};
use crate::metrics::{MetricsCalculator, PerformanceReport, TurnoverStats};
use crate::regime::{Regime, TransitionEvent};
use crate::validation::{check_prices, price_at, PriceField};

use super::costs::TransactionCostModel;

/// When a signal generated at bar `t` is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceTiming {
    /// At the close of the signal bar.
    SignalClose,
    /// At the open of the next bar.
    NextOpen,
    /// At the open of the first bar in a later calendar month.
    #[default]
    NextMonthOpen,
}

impl RebalanceTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignalClose => "signal_close",
            Self::NextOpen => "next_open",
            Self::NextMonthOpen => "next_month_open",
        }
    }

    /// Price the switch executes at.
    pub fn fill_field(&self) -> PriceField {
        match self {
            Self::SignalClose => PriceField::Close,
            Self::NextOpen | Self::NextMonthOpen => PriceField::Open,
        }
    }

    pub fn needs_opens(&self) -> bool {
        self.fill_field() == PriceField::Open
    }

    /// Execution bar for a signal at `signal`, or `None` if it falls past the
    /// end of the index.
    pub fn fill_index(&self, index: &TimeIndex, signal: usize) -> Option<usize> {
        match self {
            Self::SignalClose => (signal < index.len()).then_some(signal),
            Self::NextOpen => (signal + 1 < index.len()).then_some(signal + 1),
            Self::NextMonthOpen => {
                let date = index.date(signal)?;
                let month = (date.year(), date.month());
                index
                    .dates()
                    .iter()
                    .enumerate()
                    .skip(signal + 1)
                    .find(|(_, d)| (d.year(), d.month()) > month)
                    .map(|(i, _)| i)
            }
        }
    }
}

/// Column names of one asset in the price file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceColumns {
    pub close: String,
    #[serde(default)]
    pub open: Option<String>,
}

impl PriceColumns {
    pub fn new(close: &str, open: Option<&str>) -> Self {
        Self {
            close: close.to_string(),
            open: open.map(str::to_string),
        }
    }
}

/// Configuration for the portfolio accountant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting portfolio value.
    pub initial_equity: Decimal,

    /// Execution delay applied to every signal.
    pub rebalance_on: RebalanceTiming,

    /// Switch costs.
    pub costs: TransactionCostModel,

    /// Bars per year, for annualization (12 for monthly data).
    pub periods_per_year: u32,

    /// Annual risk-free rate used by the Sharpe and Sortino ratios.
    pub risk_free_rate: f64,

    /// First bar of the accounting window; signals still warm up before it.
    pub start_date: Option<NaiveDate>,

    /// Risk asset price columns.
    pub price_risk: PriceColumns,

    /// Safe-haven asset price columns.
    pub price_safe: PriceColumns,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: Decimal::from(100_000),
            rebalance_on: RebalanceTiming::default(),
            costs: TransactionCostModel::default(),
            periods_per_year: 12,
            risk_free_rate: 0.0,
            start_date: None,
            price_risk: PriceColumns::new("SPY", Some("SPY_open")),
            price_safe: PriceColumns::new("TLT", Some("TLT_open")),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> RotatorResult<()> {
        if self.initial_equity <= Decimal::ZERO {
            return Err(RotatorError::config(format!(
                "initial_equity must be positive, got {}",
                self.initial_equity
            )));
        }
        if self.periods_per_year == 0 {
            return Err(RotatorError::config("periods_per_year must be >= 1"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(RotatorError::config("risk_free_rate must be finite"));
        }
        self.costs.validate()?;

        if self.rebalance_on.needs_opens() {
            for columns in [&self.price_risk, &self.price_safe] {
                if columns.open.is_none() {
                    return Err(RotatorError::config(format!(
                        "rebalance_on = {} needs an open-price column for {}",
                        self.rebalance_on.as_str(),
                        columns.close
                    )));
                }
            }
        }
        Ok(())
    }

    fn initial_value(&self) -> RotatorResult<f64> {
        f64::try_from(self.initial_equity)
            .map_err(|_| RotatorError::config("initial_equity is not representable as f64"))
    }
}

/// Portfolio snapshot at the close of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub date: NaiveDate,
    pub holdings_value: f64,
    /// Asset held at the close of the bar.
    pub state: Regime,
    /// Cumulative value lost to switch costs.
    pub cost_accrued: f64,
    /// Whether a switch executed on this bar.
    pub switched: bool,
}

/// Record of one executed switch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub signal_date: NaiveDate,
    pub signal_index: usize,
    pub executed_on: NaiveDate,
    pub fill_index: usize,
    pub fill: PriceField,
    pub from: Regime,
    pub to: Regime,
    /// Portfolio value immediately before the cost was charged.
    pub value_before: f64,
    pub cost: f64,
}

/// Result of a completed backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub portfolio: Vec<PortfolioState>,
    pub executions: Vec<Execution>,
    /// Transitions whose execution bar lies past the end of the data.
    pub pending_signals: Vec<TransitionEvent>,
    pub turnover: TurnoverStats,
    pub report: PerformanceReport,
}

impl BacktestResult {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.portfolio.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.portfolio.iter().map(|p| p.holdings_value).collect()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.portfolio.last().map(|p| p.holdings_value)
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let start = self.portfolio.first().map(|p| p.date.to_string()).unwrap_or_default();
        let end = self.portfolio.last().map(|p| p.date.to_string()).unwrap_or_default();
        format!(
            "Backtest Results ({} to {})\n\
             ----------------------------------------\n\
             Final Value: {:.2}\n\
             {}\n\
             Total Cost: {:.2}\n\
             Pending Signals: {}",
            start,
            end,
            self.final_value().unwrap_or(0.0),
            self.report.summary(),
            self.turnover.total_cost,
            self.pending_signals.len(),
        )
    }
}

struct Scheduled<'a> {
    signal: usize,
    fill: usize,
    event: &'a TransitionEvent,
}

/// The portfolio accountant.
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> RotatorResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// First bar of the accounting window.
    pub fn start_index(&self, index: &TimeIndex) -> RotatorResult<usize> {
        match self.config.start_date {
            None if index.is_empty() => Err(RotatorError::Data("empty time index".to_string())),
            None => Ok(0),
            Some(date) => index.position_at_or_after(date).ok_or_else(|| {
                RotatorError::config(format!("start_date {} is after the last bar", date))
            }),
        }
    }

    /// Replay `transitions` starting from `initial_state`.
    pub fn run(
        &self,
        index: &TimeIndex,
        transitions: &[TransitionEvent],
        initial_state: Regime,
        price_risk: &PriceSeries,
        price_safe: &PriceSeries,
    ) -> RotatorResult<BacktestResult> {
        let start = self.start_index(index)?;
        check_prices(index, price_risk, start)?;
        check_prices(index, price_safe, start)?;

        let timing = self.config.rebalance_on;
        let fill_field = timing.fill_field();
        let prices = |regime: Regime| match regime {
            Regime::RiskOn => price_risk,
            Regime::RiskOff => price_safe,
        };

        let mut scheduled = Vec::with_capacity(transitions.len());
        let mut pending_signals = Vec::new();
        let mut turnover_count = 0;
        for event in transitions {
            let signal = index
                .position(event.date)
                .ok_or_else(|| RotatorError::gap("transitions", event.date))?;
            if signal >= start {
                turnover_count += 1;
            }
            match timing.fill_index(index, signal) {
                Some(fill) => scheduled.push(Scheduled { signal, fill, event }),
                None => pending_signals.push(*event),
            }
        }
        scheduled.sort_by_key(|s| (s.fill, s.signal));

        let mut holding = initial_state;
        let mut cursor = 0;
        while cursor < scheduled.len() && scheduled[cursor].fill <= start {
            holding = scheduled[cursor].event.to_state;
            cursor += 1;
        }

        let mut value = self.config.initial_value()?;
        let mut cost_accrued = 0.0;
        let mut retained = 1.0;
        let mut executions = Vec::new();
        let mut portfolio = Vec::with_capacity(index.len() - start);
        portfolio.push(PortfolioState {
            date: index.dates()[start],
            holdings_value: value,
            state: holding,
            cost_accrued,
            switched: false,
        });

        for i in start + 1..index.len() {
            let date = index.dates()[i];

            let mut target = holding;
            let mut trigger = None;
            while cursor < scheduled.len() && scheduled[cursor].fill == i {
                target = scheduled[cursor].event.to_state;
                trigger = Some(&scheduled[cursor]);
                cursor += 1;
            }
            if trigger.is_some() && target == holding {
                debug!("Signals executing on {} cancel out, holding {}", date, holding.as_str());
            }

            let old = prices(holding);
            let prev_close = price_at(index, old, i - 1, PriceField::Close)?;
            let switched = match trigger {
                Some(s) if target != holding => {
                    let new = prices(target);
                    let value_before = match fill_field {
                        PriceField::Open => value * price_at(index, old, i, PriceField::Open)? / prev_close,
                        PriceField::Close => value * price_at(index, old, i, PriceField::Close)? / prev_close,
                    };
                    let cost = self.config.costs.calculate(value_before);
                    value = cost.value_after();
                    if fill_field == PriceField::Open {
                        value *= price_at(index, new, i, PriceField::Close)?
                            / price_at(index, new, i, PriceField::Open)?;
                    }
                    cost_accrued += cost.total;
                    retained *= 1.0 - cost.fraction;
                    executions.push(Execution {
                        signal_date: s.event.date,
                        signal_index: s.signal,
                        executed_on: date,
                        fill_index: i,
                        fill: fill_field,
                        from: holding,
                        to: target,
                        value_before,
                        cost: cost.total,
                    });
                    holding = target;
                    true
                }
                _ => {
                    value *= price_at(index, old, i, PriceField::Close)? / prev_close;
                    false
                }
            };

            portfolio.push(PortfolioState {
                date,
                holdings_value: value,
                state: holding,
                cost_accrued,
                switched,
            });
        }

        let turnover = TurnoverStats {
            turnover_count,
            executed_switches: executions.len(),
            total_cost: cost_accrued,
            cost_drag: 1.0 - retained,
        };
        let dates: Vec<NaiveDate> = portfolio.iter().map(|p| p.date).collect();
        let values: Vec<f64> = portfolio.iter().map(|p| p.holdings_value).collect();
        let report = MetricsCalculator::calculate(
            &dates,
            &values,
            self.config.periods_per_year,
            self.config.risk_free_rate,
            turnover,
        );

        info!(
            "Backtest complete: {} bars, {} switches executed, {} pending, final value {:.2}",
            portfolio.len(),
            executions.len(),
            pending_signals.len(),
            value
        );

        Ok(BacktestResult {
            portfolio,
            executions,
            pending_signals,
            turnover,
            report,
        })
    }
}

/// Run the accountant once with `config`.
pub fn run_backtest(
    index: &TimeIndex,
    transitions: &[TransitionEvent],
    initial_state: Regime,
    price_risk: &PriceSeries,
    price_safe: &PriceSeries,
    config: &BacktestConfig,
) -> RotatorResult<BacktestResult> {
    BacktestEngine::new(config.clone())?.run(index, transitions, initial_state, price_risk, price_safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;
    use crate::regime::{SwitchAction, TransitionReason};
    use crate::signals::FilterGate;
    use rust_decimal_macros::dec;

    fn event(index: &TimeIndex, i: usize, from: Regime) -> TransitionEvent {
        let to = from.opposite();
        TransitionEvent {
            date: index.dates()[i],
            from_state: from,
            to_state: to,
            action: SwitchAction::for_target(to),
            reason: TransitionReason {
                leading: 0.0,
                d_leading: 0.0,
                coincident: 0.0,
                d_coincident: 0.0,
                iceberg: false,
                sinking: false,
                recovery_candidate: false,
                streak: 2,
                euphoria_gate: FilterGate::Unconfigured,
                recovery_doubt_gate: FilterGate::Unconfigured,
            },
        }
    }

    fn config(timing: RebalanceTiming, costs: TransactionCostModel) -> BacktestConfig {
        BacktestConfig {
            initial_equity: dec!(1000),
            rebalance_on: timing,
            costs,
            ..Default::default()
        }
    }

    fn prices() -> (PriceSeries, PriceSeries) {
        let risk = PriceSeries::from_open_close(
            "SPY",
            &[100.0, 102.0, 108.0, 95.0, 99.0, 104.0],
            &[100.0, 105.0, 110.0, 98.0, 100.0, 106.0],
        );
        let safe = PriceSeries::from_open_close(
            "TLT",
            &[50.0, 50.5, 51.0, 51.5, 52.0, 52.5],
            &[50.0, 51.0, 51.5, 52.0, 52.5, 53.0],
        );
        (risk, safe)
    }

    #[test]
    fn test_fill_index() {
        let index = TimeIndex::monthly(2020, 1, 3).unwrap();
        assert_eq!(RebalanceTiming::SignalClose.fill_index(&index, 1), Some(1));
        assert_eq!(RebalanceTiming::NextOpen.fill_index(&index, 1), Some(2));
        assert_eq!(RebalanceTiming::NextOpen.fill_index(&index, 2), None);
        assert_eq!(RebalanceTiming::NextMonthOpen.fill_index(&index, 0), Some(1));

        let daily = TimeIndex::new(vec![
            NaiveDate::from_ymd_opt(2020, 1, 30).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2020, 2, 3).unwrap(),
        ])
        .unwrap();
        assert_eq!(RebalanceTiming::NextMonthOpen.fill_index(&daily, 0), Some(2));
        assert_eq!(RebalanceTiming::NextMonthOpen.fill_index(&daily, 2), None);
    }

    #[test]
    fn test_no_transitions_is_buy_and_hold() {
        let index = TimeIndex::monthly(2020, 1, 6).unwrap();
        let (risk, safe) = prices();
        let cfg = config(RebalanceTiming::NextMonthOpen, TransactionCostModel::default());
        let result = run_backtest(&index, &[], Regime::RiskOn, &risk, &safe, &cfg).unwrap();

        assert!(result.executions.is_empty());
        assert!((result.final_value().unwrap() - 1060.0).abs() < 1e-9);
        assert_eq!(result.report.turnover_count, 0);
        assert_eq!(result.report.cost_drag, 0.0);
        assert!(result.portfolio.iter().all(|p| p.state == Regime::RiskOn));
    }

    #[test]
    fn test_next_open_execution() {
        let index = TimeIndex::monthly(2020, 1, 6).unwrap();
        let (risk, safe) = prices();
        let cfg = config(RebalanceTiming::NextOpen, TransactionCostModel::zero());
        let transitions = [event(&index, 2, Regime::RiskOn)];
        let result = run_backtest(&index, &transitions, Regime::RiskOn, &risk, &safe, &cfg).unwrap();

        let exec = result.executions[0];
        assert_eq!(exec.signal_index, 2);
        assert_eq!(exec.fill_index, 3);
        assert_eq!(exec.fill, PriceField::Open);

        // 1000 * 110/100, then SPY open 95 / close 110, then TLT close 52 / open 51.5
        let expected_bar3 = 1100.0 * (95.0 / 110.0) * (52.0 / 51.5);
        assert!((result.portfolio[3].holdings_value - expected_bar3).abs() < 1e-9);
        assert_eq!(result.portfolio[2].state, Regime::RiskOn);
        assert_eq!(result.portfolio[3].state, Regime::RiskOff);
        assert!(result.portfolio[3].switched);
    }

    #[test]
    fn test_signal_is_never_executed_on_its_own_bar() {
        let index = TimeIndex::monthly(2020, 1, 6).unwrap();
        let (risk, safe) = prices();
        let transitions = [event(&index, 2, Regime::RiskOn), event(&index, 4, Regime::RiskOff)];

        for timing in [RebalanceTiming::NextOpen, RebalanceTiming::NextMonthOpen] {
            let cfg = config(timing, TransactionCostModel::default());
            let base = run_backtest(&index, &transitions, Regime::RiskOn, &risk, &safe, &cfg).unwrap();
            for exec in &base.executions {
                assert!(exec.fill_index > exec.signal_index);
            }

            // Moving the signal-bar close of the asset being bought must not
            // change any value: the fill happens at the next bar's open.
            let mut bars = safe.bars.clone();
            bars[2] = Some(PriceBar::open_close(51.0, 80.0));
            let shocked = PriceSeries::new("TLT", bars);
            let moved = run_backtest(&index, &transitions[..1], Regime::RiskOn, &risk, &shocked, &cfg).unwrap();
            let unmoved = run_backtest(&index, &transitions[..1], Regime::RiskOn, &risk, &safe, &cfg).unwrap();
            assert_eq!(moved.values(), unmoved.values());
        }

        // signal_close fills at the signal bar's close, so the same shock matters
        let cfg = config(RebalanceTiming::SignalClose, TransactionCostModel::default());
        let mut bars = safe.bars.clone();
        bars[2] = Some(PriceBar::open_close(51.0, 80.0));
        let shocked = PriceSeries::new("TLT", bars);
        let moved = run_backtest(&index, &transitions[..1], Regime::RiskOn, &risk, &shocked, &cfg).unwrap();
        let unmoved = run_backtest(&index, &transitions[..1], Regime::RiskOn, &risk, &safe, &cfg).unwrap();
        assert_ne!(moved.values(), unmoved.values());
    }

    #[test]
    fn test_cost_conservation() {
        let index = TimeIndex::monthly(2020, 1, 6).unwrap();
        let flat = PriceSeries::from_open_close("SPY", &[10.0; 6], &[10.0; 6]);
        let flat_safe = PriceSeries::from_open_close("TLT", &[20.0; 6], &[20.0; 6]);
        let transitions = [
            event(&index, 0, Regime::RiskOn),
            event(&index, 1, Regime::RiskOff),
            event(&index, 3, Regime::RiskOn),
        ];
        let costs = TransactionCostModel::new(dec!(20), dec!(5));
        let cfg = config(RebalanceTiming::NextOpen, costs);
        let result = run_backtest(&index, &transitions, Regime::RiskOn, &flat, &flat_safe, &cfg).unwrap();

        let k = result.report.turnover_count as i32;
        assert_eq!(k, 3);
        let expected_ratio = (1.0 - 0.0025f64).powi(k);
        assert!((result.final_value().unwrap() / 1000.0 - expected_ratio).abs() < 1e-12);
        assert!((result.report.cost_drag - (1.0 - expected_ratio)).abs() < 1e-12);
        assert!((result.turnover.total_cost - (1000.0 - result.final_value().unwrap())).abs() < 1e-9);
    }

    #[test]
    fn test_missing_price_is_fatal() {
        let index = TimeIndex::monthly(2020, 1, 3).unwrap();
        let risk = PriceSeries::new(
            "SPY",
            vec![Some(PriceBar::close(1.0)), None, Some(PriceBar::close(1.1))],
        );
        let safe = PriceSeries::from_closes("TLT", &[1.0, 1.0, 1.0]);
        let cfg = config(RebalanceTiming::SignalClose, TransactionCostModel::zero());
        let err = run_backtest(&index, &[], Regime::RiskOn, &risk, &safe, &cfg).unwrap_err();
        assert_eq!(err.kind(), "data_gap");
        assert_eq!(err.series_id(), Some("SPY"));
        assert_eq!(err.date(), index.date(1));

        // next_open needs opens on the execution bar
        let cfg = config(RebalanceTiming::NextOpen, TransactionCostModel::zero());
        let transitions = [event(&index, 0, Regime::RiskOn)];
        let closes = PriceSeries::from_closes("SPY", &[1.0, 1.0, 1.0]);
        let err = run_backtest(&index, &transitions, Regime::RiskOn, &closes, &safe, &cfg).unwrap_err();
        assert_eq!(err.kind(), "data_gap");
    }

    #[test]
    fn test_pending_and_start_date() {
        let index = TimeIndex::monthly(2020, 1, 6).unwrap();
        let (risk, safe) = prices();
        let transitions = [event(&index, 1, Regime::RiskOn), event(&index, 5, Regime::RiskOff)];
        let mut cfg = config(RebalanceTiming::NextMonthOpen, TransactionCostModel::default());
        cfg.start_date = index.date(3);
        let result = run_backtest(&index, &transitions, Regime::RiskOn, &risk, &safe, &cfg).unwrap();

        // first switch filled before the window and is absorbed without cost
        assert_eq!(result.portfolio[0].state, Regime::RiskOff);
        assert_eq!(result.portfolio.len(), 3);
        assert!(result.executions.is_empty());
        assert_eq!(result.pending_signals.len(), 1);
        assert_eq!(result.report.turnover_count, 1);
    }

    #[test]
    fn test_determinism() {
        let index = TimeIndex::monthly(2020, 1, 6).unwrap();
        let (risk, safe) = prices();
        let transitions = [event(&index, 1, Regime::RiskOn), event(&index, 3, Regime::RiskOff)];
        let cfg = BacktestConfig::default();
        let a = run_backtest(&index, &transitions, Regime::RiskOn, &risk, &safe, &cfg).unwrap();
        let b = run_backtest(&index, &transitions, Regime::RiskOn, &risk, &safe, &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_validation() {
        let mut cfg = BacktestConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.price_safe.open = None;
        assert!(cfg.validate().is_err());
        cfg.rebalance_on = RebalanceTiming::SignalClose;
        assert!(cfg.validate().is_ok());
        cfg.periods_per_year = 0;
        assert!(cfg.validate().is_err());
    }
}
