//! Regime state machine.
//!
//! Two states, RISK_ON (risk asset) and RISK_OFF (long bond):
//! - RISK_ON -> RISK_OFF after `confirm_periods` consecutive iceberg readings
//!   with a falling leading index
//! - RISK_OFF -> RISK_ON after `confirm_periods` consecutive readings above
//!   `iceberg_threshold + hysteresis` with a rising leading index

pub mod state_machine;

pub use state_machine::{
    IndexReading, Regime, RegimeMachine, RegimeParams, RegimeRun, RegimeState, RegimeStats,
    StepInput, StepOutcome, SwitchAction, TransitionEvent, TransitionReason,
};
