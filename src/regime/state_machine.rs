//! Two-state regime machine.
//!
//! `step(state, input) -> state'` is pure: the only memory is the
//! [`RegimeState`] value handed from one timestamp to the next.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RotatorConfig;
use crate::error::{RotatorError, RotatorResult};
use crate::signals::{EventFlags, EventThresholds, FilterGate};

/// Portfolio regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Holding the risk asset.
    RiskOn,
    /// Holding the safe-haven bond.
    RiskOff,
}

impl Regime {
    pub fn opposite(&self) -> Self {
        match self {
            Self::RiskOn => Self::RiskOff,
            Self::RiskOff => Self::RiskOn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RiskOn => "RISK_ON",
            Self::RiskOff => "RISK_OFF",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RiskOn => "Risk asset held, economy expanding",
            Self::RiskOff => "Long bond held, leading indicators weakening",
        }
    }
}

/// Action emitted on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchAction {
    ExitEquityEnterLongBond,
    ExitLongBondEnterEquity,
}

impl SwitchAction {
    pub fn for_target(to: Regime) -> Self {
        match to {
            Regime::RiskOff => Self::ExitEquityEnterLongBond,
            Regime::RiskOn => Self::ExitLongBondEnterEquity,
        }
    }
}

/// Memory carried across timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    /// Date of the last transition (or of the first timestamp).
    pub since: NaiveDate,
    /// Length of the current qualifying streak.
    pub confirm_counter: u32,
}

/// Composite readings at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexReading {
    pub leading: f64,
    pub coincident: f64,
    pub d_coincident: f64,
    pub flags: EventFlags,
}

/// Everything the machine sees at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInput {
    pub date: NaiveDate,
    /// `None` while either composite is undefined.
    pub reading: Option<IndexReading>,
    pub euphoria: FilterGate,
    pub recovery_doubt: FilterGate,
}

/// Snapshot of the values that justified a transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionReason {
    pub leading: f64,
    pub d_leading: f64,
    pub coincident: f64,
    pub d_coincident: f64,
    pub iceberg: bool,
    pub sinking: bool,
    pub recovery_candidate: bool,
    pub streak: u32,
    pub euphoria_gate: FilterGate,
    pub recovery_doubt_gate: FilterGate,
}

/// Immutable record of a fired transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub date: NaiveDate,
    pub from_state: Regime,
    pub to_state: Regime,
    pub action: SwitchAction,
    pub reason: TransitionReason,
}

/// Result of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub state: RegimeState,
    pub transition: Option<TransitionEvent>,
}

/// Validated machine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeParams {
    pub confirm_periods: u32,
    pub thresholds: EventThresholds,
    pub require_sinking_confirmation: bool,
    pub initial_state: Regime,
}

impl RegimeParams {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            confirm_periods: config.confirm_periods,
            thresholds: EventThresholds {
                iceberg: config.iceberg_threshold,
                sinking: config.sinking_threshold,
                hysteresis: config.hysteresis,
            },
            require_sinking_confirmation: config.require_sinking_confirmation,
            initial_state: config.initial_state,
        }
    }
}

/// Full path of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeRun {
    /// State after processing each timestamp.
    pub states: Vec<RegimeState>,
    pub transitions: Vec<TransitionEvent>,
}

/// Share of the run spent in one regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: Regime,
    pub periods: usize,
    pub pct_of_total: f64,
    pub spells: usize,
}

impl RegimeRun {
    pub fn final_state(&self) -> Option<&RegimeState> {
        self.states.last()
    }

    /// Regime held after each timestamp.
    pub fn regimes(&self) -> Vec<Regime> {
        self.states.iter().map(|s| s.regime).collect()
    }

    /// Periods and spells per regime.
    pub fn stats(&self) -> HashMap<Regime, RegimeStats> {
        let mut stats: HashMap<Regime, RegimeStats> = HashMap::new();
        let total = self.states.len();
        let mut prev: Option<Regime> = None;

        for state in &self.states {
            let entry = stats.entry(state.regime).or_insert_with(|| RegimeStats {
                regime: state.regime,
                periods: 0,
                pct_of_total: 0.0,
                spells: 0,
            });
            entry.periods += 1;
            if prev != Some(state.regime) {
                entry.spells += 1;
            }
            prev = Some(state.regime);
        }

        for entry in stats.values_mut() {
            entry.pct_of_total = entry.periods as f64 / total as f64 * 100.0;
        }

        stats
    }
}

/// The regime state machine.
#[derive(Debug, Clone)]
pub struct RegimeMachine {
    params: RegimeParams,
}

impl RegimeMachine {
    /// Create a machine, rejecting invalid parameters up front.
    pub fn new(params: RegimeParams) -> RotatorResult<Self> {
        if params.confirm_periods < 1 {
            return Err(RotatorError::config("confirm_periods must be >= 1"));
        }
        if !params.thresholds.hysteresis.is_finite() || params.thresholds.hysteresis < 0.0 {
            return Err(RotatorError::config(format!(
                "hysteresis must be finite and >= 0, got {}",
                params.thresholds.hysteresis
            )));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &RegimeParams {
        &self.params
    }

    pub fn initial_state(&self, start: NaiveDate) -> RegimeState {
        RegimeState {
            regime: self.params.initial_state,
            since: start,
            confirm_counter: 0,
        }
    }

    /// Whether the reading qualifies for leaving `regime`.
    fn qualifies(&self, regime: Regime, reading: &IndexReading, gate: FilterGate) -> bool {
        let flags = &reading.flags;
        match regime {
            Regime::RiskOn => {
                flags.iceberg
                    && flags.d_leading < 0.0
                    && gate.permits()
                    && (!self.params.require_sinking_confirmation || flags.sinking)
            }
            Regime::RiskOff => flags.recovery_candidate && flags.d_leading > 0.0 && gate.permits(),
        }
    }

    /// Advance one timestamp.
    pub fn step(&self, state: &RegimeState, input: &StepInput) -> StepOutcome {
        let hold = StepOutcome {
            state: *state,
            transition: None,
        };

        let Some(reading) = input.reading else {
            return hold;
        };
        let gate = match state.regime {
            Regime::RiskOn => input.euphoria,
            Regime::RiskOff => input.recovery_doubt,
        };
        if gate == FilterGate::Undefined {
            return hold;
        }

        if !self.qualifies(state.regime, &reading, gate) {
            return StepOutcome {
                state: RegimeState {
                    confirm_counter: 0,
                    ..*state
                },
                transition: None,
            };
        }

        let streak = state.confirm_counter + 1;
        if streak < self.params.confirm_periods {
            return StepOutcome {
                state: RegimeState {
                    confirm_counter: streak,
                    ..*state
                },
                transition: None,
            };
        }

        let to = state.regime.opposite();
        let event = TransitionEvent {
            date: input.date,
            from_state: state.regime,
            to_state: to,
            action: SwitchAction::for_target(to),
            reason: TransitionReason {
                leading: reading.leading,
                d_leading: reading.flags.d_leading,
                coincident: reading.coincident,
                d_coincident: reading.d_coincident,
                iceberg: reading.flags.iceberg,
                sinking: reading.flags.sinking,
                recovery_candidate: reading.flags.recovery_candidate,
                streak,
                euphoria_gate: input.euphoria,
                recovery_doubt_gate: input.recovery_doubt,
            },
        };

        StepOutcome {
            state: RegimeState {
                regime: to,
                since: input.date,
                confirm_counter: 0,
            },
            transition: Some(event),
        }
    }

    /// Run the machine over an ordered input sequence.
    pub fn run(&self, inputs: &[StepInput]) -> RegimeRun {
        let mut states = Vec::with_capacity(inputs.len());
        let mut transitions = Vec::new();

        let Some(first) = inputs.first() else {
            return RegimeRun {
                states,
                transitions,
            };
        };

        let mut state = self.initial_state(first.date);
        for input in inputs {
            let outcome = self.step(&state, input);
            if let Some(event) = outcome.transition {
                info!(
                    date = %event.date,
                    from = event.from_state.as_str(),
                    to = event.to_state.as_str(),
                    action = ?event.action,
                    "regime transition"
                );
                transitions.push(event);
            }
            state = outcome.state;
            states.push(state);
        }

        RegimeRun {
            states,
            transitions,
        }
    }
}
