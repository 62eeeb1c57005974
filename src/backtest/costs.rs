//! Switch cost model.
//!
//! Every executed switch loses `cost_bps + slippage_bps` basis points of the
//! pre-switch portfolio value, once. Default: 5 bps commission + 5 bps slippage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RotatorError, RotatorResult};

const BPS_PER_UNIT: i64 = 10_000;

/// Cost charged for a single switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchCost {
    pub value_before: f64,
    pub fraction: f64,
    pub total: f64,
}

impl SwitchCost {
    pub fn calculate(value_before: f64, fraction: f64) -> Self {
        Self {
            value_before,
            fraction,
            total: value_before * fraction,
        }
    }

    pub fn value_after(&self) -> f64 {
        self.value_before * (1.0 - self.fraction)
    }
}

/// Configurable commission + slippage model, in basis points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCostModel {
    /// Commission / transaction cost per switch.
    pub cost_bps: Decimal,
    /// Execution slippage per switch.
    pub slippage_bps: Decimal,
}

impl Default for TransactionCostModel {
    fn default() -> Self {
        Self {
            cost_bps: Decimal::from(5),
            slippage_bps: Decimal::from(5),
        }
    }
}

impl TransactionCostModel {
    pub fn new(cost_bps: Decimal, slippage_bps: Decimal) -> Self {
        Self {
            cost_bps,
            slippage_bps,
        }
    }

    /// Create a frictionless model.
    pub fn zero() -> Self {
        Self {
            cost_bps: Decimal::ZERO,
            slippage_bps: Decimal::ZERO,
        }
    }

    pub fn total_bps(&self) -> Decimal {
        self.cost_bps + self.slippage_bps
    }

    /// Fraction of portfolio value lost per switch.
    pub fn switch_fraction(&self) -> f64 {
        let fraction = self.total_bps() / Decimal::from(BPS_PER_UNIT);
        fraction.try_into().unwrap_or(0.0)
    }

    /// Cost of switching a portfolio worth `value_before`.
    pub fn calculate(&self, value_before: f64) -> SwitchCost {
        SwitchCost::calculate(value_before, self.switch_fraction())
    }

    pub fn validate(&self) -> RotatorResult<()> {
        if self.cost_bps.is_sign_negative() || self.slippage_bps.is_sign_negative() {
            return Err(RotatorError::config("cost_bps and slippage_bps must be >= 0"));
        }
        if self.total_bps() >= Decimal::from(BPS_PER_UNIT) {
            return Err(RotatorError::config(format!(
                "total switch cost {} bps would wipe out the portfolio",
                self.total_bps()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_costs() {
        let model = TransactionCostModel::default();
        assert_eq!(model.total_bps(), dec!(10));
        assert!((model.switch_fraction() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_switch_cost() {
        let model = TransactionCostModel::new(dec!(7.5), dec!(2.5));
        let cost = model.calculate(100_000.0);
        assert!((cost.total - 100.0).abs() < 1e-9);
        assert!((cost.value_after() - 99_900.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_costs() {
        let model = TransactionCostModel::zero();
        assert_eq!(model.switch_fraction(), 0.0);
        assert_eq!(model.calculate(5_000.0).value_after(), 5_000.0);
    }

    #[test]
    fn test_validation() {
        assert!(TransactionCostModel::new(dec!(-1), dec!(0)).validate().is_err());
        assert!(TransactionCostModel::new(dec!(9000), dec!(1000)).validate().is_err());
        assert!(TransactionCostModel::default().validate().is_ok());
    }
}
