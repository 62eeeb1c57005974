//! Performance metrics calculator.
//!
//! Works on a value path (one portfolio value per period), so the same code
//! scores the strategy and every benchmark.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Switching activity and costs of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnoverStats {
    /// Transition events inside the backtest window.
    pub turnover_count: usize,
    /// Switches actually executed (and charged).
    pub executed_switches: usize,
    /// Currency value lost to costs and slippage.
    pub total_cost: f64,
    /// Fraction of value lost to costs: `1 - Π(1 - c)`.
    pub cost_drag: f64,
}

/// Aggregate statistics over a full value path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Number of return periods.
    pub periods: usize,
    pub initial_value: f64,
    pub final_value: f64,
    pub cumulative_return: f64,
    pub cagr: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// `min_t (V_t / running_max - 1)`, zero or negative.
    pub max_drawdown: f64,
    pub max_drawdown_date: Option<NaiveDate>,
    pub turnover_count: usize,
    pub executed_switches: usize,
    pub total_cost: f64,
    pub cost_drag: f64,
}

impl PerformanceReport {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        format!(
            "Cumulative Return: {:.2}%\n\
             CAGR: {:.2}%\n\
             Volatility: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             Sortino Ratio: {:.2}\n\
             Max Drawdown: {:.2}%\n\
             Turnover: {} (executed {})\n\
             Cost Drag: {:.3}%",
            self.cumulative_return * 100.0,
            self.cagr * 100.0,
            self.annualized_volatility * 100.0,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.max_drawdown * 100.0,
            self.turnover_count,
            self.executed_switches,
            self.cost_drag * 100.0,
        )
    }
}

/// Drawdown analysis details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    pub recovery_date: Option<NaiveDate>,
    /// Periods from peak to trough of the deepest drawdown.
    pub duration_periods: usize,
    pub drawdown_periods: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from a value path.
    pub fn calculate(
        dates: &[NaiveDate],
        values: &[f64],
        periods_per_year: u32,
        risk_free_rate: f64,
        turnover: TurnoverStats,
    ) -> PerformanceReport {
        let returns = Self::period_returns(values);
        let periods = returns.len();
        let ppy = periods_per_year as f64;

        let initial_value = values.first().copied().unwrap_or(0.0);
        let final_value = values.last().copied().unwrap_or(0.0);
        let cumulative_return = if initial_value > 0.0 {
            final_value / initial_value - 1.0
        } else {
            0.0
        };

        let drawdown = Self::analyze_drawdown(dates, values);
        let cagr = Self::calculate_cagr(initial_value, final_value, periods, ppy);
        let calmar_ratio = if drawdown.max_drawdown < 0.0 {
            cagr / drawdown.max_drawdown.abs()
        } else {
            0.0
        };

        PerformanceReport {
            start_date: dates.first().copied(),
            end_date: dates.last().copied(),
            periods,
            initial_value,
            final_value,
            cumulative_return,
            cagr,
            annualized_volatility: Self::annualized_volatility(&returns, ppy),
            sharpe_ratio: Self::calculate_sharpe(&returns, ppy, risk_free_rate),
            sortino_ratio: Self::calculate_sortino(&returns, ppy, risk_free_rate),
            calmar_ratio,
            max_drawdown: drawdown.max_drawdown,
            max_drawdown_date: drawdown.trough_date,
            turnover_count: turnover.turnover_count,
            executed_switches: turnover.executed_switches,
            total_cost: turnover.total_cost,
            cost_drag: turnover.cost_drag,
        }
    }

    /// Simple returns between consecutive values.
    pub fn period_returns(values: &[f64]) -> Vec<f64> {
        values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
    }

    /// `(final / initial)^(periods_per_year / periods) - 1`.
    fn calculate_cagr(initial: f64, final_val: f64, periods: usize, periods_per_year: f64) -> f64 {
        if initial <= 0.0 || final_val <= 0.0 || periods == 0 {
            return 0.0;
        }
        (final_val / initial).powf(periods_per_year / periods as f64) - 1.0
    }

    fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        returns.iter().population_std_dev() * periods_per_year.sqrt()
    }

    /// Annualized mean excess return over annualized volatility.
    fn calculate_sharpe(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let std_dev = returns.iter().population_std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }
        let excess = returns.iter().mean() - risk_free_rate / periods_per_year;
        excess * periods_per_year.sqrt() / std_dev
    }

    /// Sortino ratio (downside deviation).
    fn calculate_sortino(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let target = risk_free_rate / periods_per_year;
        let downside_variance = returns
            .iter()
            .filter(|&&r| r < target)
            .map(|r| (r - target).powi(2))
            .sum::<f64>()
            / returns.len() as f64;
        let downside_dev = downside_variance.sqrt();
        if downside_dev == 0.0 {
            return 0.0;
        }
        (returns.iter().mean() - target) * periods_per_year.sqrt() / downside_dev
    }

    /// Analyze drawdown from a value path.
    pub fn analyze_drawdown(dates: &[NaiveDate], values: &[f64]) -> DrawdownAnalysis {
        let mut analysis = DrawdownAnalysis {
            max_drawdown: 0.0,
            peak_date: None,
            trough_date: None,
            recovery_date: None,
            duration_periods: 0,
            drawdown_periods: 0,
        };
        let Some(&first) = values.first() else {
            return analysis;
        };

        let mut peak = first;
        let mut peak_idx = 0;
        let mut max_peak_idx = 0;
        let mut in_drawdown = false;
        let mut awaiting_recovery = false;

        for (i, &value) in values.iter().enumerate() {
            if value >= peak {
                if in_drawdown {
                    analysis.drawdown_periods += 1;
                    in_drawdown = false;
                }
                if awaiting_recovery {
                    analysis.recovery_date = dates.get(i).copied();
                    awaiting_recovery = false;
                }
                peak = value;
                peak_idx = i;
                continue;
            }

            in_drawdown = true;
            let drawdown = value / peak - 1.0;
            if drawdown < analysis.max_drawdown {
                analysis.max_drawdown = drawdown;
                analysis.trough_date = dates.get(i).copied();
                analysis.duration_periods = i - peak_idx;
                analysis.recovery_date = None;
                max_peak_idx = peak_idx;
                awaiting_recovery = true;
            }
        }
        if in_drawdown {
            analysis.drawdown_periods += 1;
        }
        if analysis.max_drawdown < 0.0 {
            analysis.peak_date = dates.get(max_peak_idx).copied();
        }

        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        (0..n)
            .map(|i| start.checked_add_months(chrono::Months::new(i as u32)).unwrap())
            .collect()
    }

    #[test]
    fn test_cagr() {
        // 100 -> 121 over 24 monthly periods = 10% CAGR
        let cagr = MetricsCalculator::calculate_cagr(100.0, 121.0, 24, 12.0);
        assert!((cagr - 0.10).abs() < 1e-12);
        assert_eq!(MetricsCalculator::calculate_cagr(100.0, 121.0, 0, 12.0), 0.0);
    }

    #[test]
    fn test_drawdown() {
        let values = [100.0, 120.0, 90.0, 110.0, 130.0, 117.0];
        let d = dates(values.len());
        let analysis = MetricsCalculator::analyze_drawdown(&d, &values);
        assert!((analysis.max_drawdown + 0.25).abs() < 1e-12);
        assert_eq!(analysis.peak_date, Some(d[1]));
        assert_eq!(analysis.trough_date, Some(d[2]));
        assert_eq!(analysis.recovery_date, Some(d[4]));
        assert_eq!(analysis.duration_periods, 1);
        assert_eq!(analysis.drawdown_periods, 2);
    }

    #[test]
    fn test_drawdown_empty_and_monotonic() {
        assert_eq!(MetricsCalculator::analyze_drawdown(&[], &[]).max_drawdown, 0.0);
        let values = [1.0, 2.0, 3.0];
        let analysis = MetricsCalculator::analyze_drawdown(&dates(3), &values);
        assert_eq!(analysis.max_drawdown, 0.0);
        assert_eq!(analysis.peak_date, None);
    }

    #[test]
    fn test_sharpe_zero_for_flat_path() {
        let returns = MetricsCalculator::period_returns(&[100.0, 100.0, 100.0]);
        assert_eq!(MetricsCalculator::calculate_sharpe(&returns, 12.0, 0.0), 0.0);
        assert_eq!(MetricsCalculator::annualized_volatility(&returns, 12.0), 0.0);
    }

    #[test]
    fn test_sharpe_sign_and_scale() {
        let returns = [0.02, -0.01, 0.03, 0.00];
        let sharpe = MetricsCalculator::calculate_sharpe(&returns, 12.0, 0.0);
        let mean = 0.01;
        let std = (((0.01f64).powi(2) + (0.02f64).powi(2) + (0.02f64).powi(2) + (0.01f64).powi(2)) / 4.0).sqrt();
        assert!((sharpe - mean * 12f64.sqrt() / std).abs() < 1e-9);

        let with_rf = MetricsCalculator::calculate_sharpe(&returns, 12.0, 0.12);
        assert!(with_rf.abs() < 1e-9);
    }

    #[test]
    fn test_full_report() {
        let values = [100.0, 110.0, 99.0, 108.9];
        let d = dates(values.len());
        let report = MetricsCalculator::calculate(
            &d,
            &values,
            12,
            0.0,
            TurnoverStats {
                turnover_count: 2,
                executed_switches: 2,
                total_cost: 1.5,
                cost_drag: 0.002,
            },
        );
        assert_eq!(report.periods, 3);
        assert!((report.cumulative_return - 0.089).abs() < 1e-12);
        assert!((report.max_drawdown + 0.1).abs() < 1e-12);
        assert_eq!(report.max_drawdown_date, Some(d[2]));
        assert_eq!(report.turnover_count, 2);
        assert!(report.summary().contains("Turnover: 2"));
    }
}
