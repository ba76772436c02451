//! bts-metrics
//!
//! Strategy metrics derived from a daily value series.  Pure `f64` math over
//! reporting outputs — ledger state never flows through here, so float
//! arithmetic is acceptable.
//!
//! Conventions:
//! - returns are simple daily returns `v[i]/v[i-1] − 1`
//! - standard deviation is the population deviation
//! - annualization uses a configurable trading-day count (default 252)
//! - max drawdown is reported as a non-positive number
//!   (`min(v/peak − 1)`); Calmar divides by its magnitude

use bts_schemas::MICROS_SCALE;
use serde::{Deserialize, Serialize};

/// Default trading days per year.
pub const DEFAULT_ANNUAL_DAYS: u32 = 252;

// ---------------------------------------------------------------------------
// StrategyMetrics
// ---------------------------------------------------------------------------

/// The metrics block returned to clients.
///
/// A zeroed block (the `Default`) stands for "no trades yet" — that outcome
/// is a success, not an error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub total_profit: f64,
    pub total_return: f64,
    pub annual_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Non-positive; −0.18 means an 18 % peak-to-trough loss.
    pub max_drawdown: f64,
    /// Annualized volatility of daily returns.
    pub volatility: f64,
    pub win_rate: f64,
    /// Number of sell fills the win rate is computed over.
    pub total_sells: u32,
}

impl StrategyMetrics {
    /// Metrics over an account's daily assets series.
    ///
    /// `assets_micros` is the dated series including the final row;
    /// `principal_micros` anchors total return and is prepended as the
    /// day-zero baseline for the return series.  `winning_sells` /
    /// `total_sells` feed the win rate.  Series shorter than one day of
    /// movement yield the zero block.
    pub fn from_assets(
        assets_micros: &[i64],
        principal_micros: i64,
        rf_annual: f64,
        annual_days: u32,
        winning_sells: u32,
        total_sells: u32,
    ) -> Self {
        if assets_micros.is_empty() || principal_micros <= 0 {
            return Self::default();
        }

        let mut values: Vec<f64> = Vec::with_capacity(assets_micros.len() + 1);
        values.push(principal_micros as f64 / MICROS_SCALE as f64);
        values.extend(
            assets_micros
                .iter()
                .map(|v| *v as f64 / MICROS_SCALE as f64),
        );

        let mut m = Self::from_values(&values, rf_annual, annual_days);
        m.total_profit = values[values.len() - 1] - values[0];
        m.win_rate = if total_sells == 0 {
            0.0
        } else {
            winning_sells as f64 / total_sells as f64
        };
        m.total_sells = total_sells;
        m
    }

    /// Metrics over a raw value series (used for benchmark comparison).
    ///
    /// The win rate here is the fraction of up days, mirroring how the
    /// benchmark has no trades to count.
    pub fn from_values(values: &[f64], rf_annual: f64, annual_days: u32) -> Self {
        if values.len() < 2 || values[0] <= 0.0 {
            return Self::default();
        }
        let returns = simple_returns(values);
        let n = returns.len() as f64;
        let rf_daily = rf_annual / annual_days as f64;

        let total_return = values[values.len() - 1] / values[0] - 1.0;
        let annual_return = annualized(total_return, returns.len() as u32, annual_days);

        let excess: Vec<f64> = returns.iter().map(|r| r - rf_daily).collect();
        let (mean_excess, std_excess) = mean_std(&excess);
        let sharpe = ratio(mean_excess, std_excess) * (annual_days as f64).sqrt();

        let sortino = ratio(mean_excess, downside_deviation(&excess)) * (annual_days as f64).sqrt();

        let mdd = max_drawdown(values);
        let calmar = ratio(annual_return, mdd.abs());

        let (_, std_plain) = mean_std(&returns);
        let volatility = std_plain * (annual_days as f64).sqrt();

        let up_days = returns.iter().filter(|r| **r > 0.0).count() as f64;

        Self {
            total_profit: 0.0,
            total_return,
            annual_return,
            sharpe,
            sortino,
            calmar,
            max_drawdown: mdd,
            volatility,
            win_rate: up_days / n,
            total_sells: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// Simple daily returns `v[i]/v[i-1] − 1`.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { w[1] / w[0] - 1.0 })
        .collect()
}

/// Population mean and standard deviation.
pub fn mean_std(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

/// `(1 + total)^(annual_days / n_days) − 1`; zero for an empty window.
pub fn annualized(total_return: f64, n_days: u32, annual_days: u32) -> f64 {
    if n_days == 0 {
        return 0.0;
    }
    (1.0 + total_return).powf(annual_days as f64 / n_days as f64) - 1.0
}

/// Largest peak-relative loss over the series; non-positive.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut mdd = 0.0f64;
    for v in values {
        if *v > peak {
            peak = *v;
        }
        if peak > 0.0 {
            let dd = v / peak - 1.0;
            if dd < mdd {
                mdd = dd;
            }
        }
    }
    mdd
}

/// Downside deviation: RMS of the negative excess returns over all days.
pub fn downside_deviation(excess: &[f64]) -> f64 {
    if excess.is_empty() {
        return 0.0;
    }
    let sum_sq = excess
        .iter()
        .map(|r| {
            let d = r.min(0.0);
            d * d
        })
        .sum::<f64>();
    (sum_sq / excess.len() as f64).sqrt()
}

fn ratio(num: f64, den: f64) -> f64 {
    if den <= 0.0 {
        0.0
    } else {
        num / den
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const M: i64 = MICROS_SCALE;

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} !≈ {b}");
    }

    // --- Building blocks ---

    #[test]
    fn simple_returns_basic() {
        let r = simple_returns(&[100.0, 110.0, 99.0]);
        approx(r[0], 0.10);
        approx(r[1], -0.10);
    }

    #[test]
    fn mean_std_population() {
        let (mean, std) = mean_std(&[1.0, 2.0, 3.0, 4.0]);
        approx(mean, 2.5);
        approx(std, (1.25f64).sqrt());
    }

    #[test]
    fn max_drawdown_tracks_running_peak() {
        // Peak 120, trough 90 → −25 %.
        let mdd = max_drawdown(&[100.0, 120.0, 90.0, 110.0]);
        approx(mdd, 90.0 / 120.0 - 1.0);
    }

    #[test]
    fn max_drawdown_of_monotone_series_is_zero() {
        approx(max_drawdown(&[100.0, 101.0, 105.0]), 0.0);
    }

    #[test]
    fn annualized_compounds() {
        // 1 % over one day at 252 days/year.
        approx(annualized(0.01, 1, 252), 1.01f64.powf(252.0) - 1.0);
        // A full year is the identity.
        approx(annualized(0.10, 252, 252), 0.10);
    }

    // --- StrategyMetrics ---

    #[test]
    fn no_trades_yields_zero_block() {
        let m = StrategyMetrics::from_assets(&[], 1_000_000 * M, 0.03, 252, 0, 0);
        assert_eq!(m, StrategyMetrics::default());
    }

    #[test]
    fn flat_series_has_zero_everything() {
        let assets = vec![1_000_000 * M; 5];
        let m = StrategyMetrics::from_assets(&assets, 1_000_000 * M, 0.0, 252, 0, 0);
        approx(m.total_return, 0.0);
        approx(m.max_drawdown, 0.0);
        approx(m.sharpe, 0.0); // zero std → ratio guard
        approx(m.volatility, 0.0);
    }

    #[test]
    fn total_return_is_anchored_on_principal() {
        let assets = vec![1_050_000 * M];
        let m = StrategyMetrics::from_assets(&assets, 1_000_000 * M, 0.0, 252, 1, 1);
        approx(m.total_return, 0.05);
        approx(m.total_profit, 50_000.0);
        approx(m.win_rate, 1.0);
        assert_eq!(m.total_sells, 1);
    }

    #[test]
    fn win_rate_counts_profitable_sells() {
        let assets = vec![1_000_000 * M, 1_010_000 * M];
        let m = StrategyMetrics::from_assets(&assets, 1_000_000 * M, 0.0, 252, 3, 4);
        approx(m.win_rate, 0.75);
    }

    #[test]
    fn sharpe_positive_for_steady_gains_with_noise() {
        let values = vec![100.0, 101.0, 100.5, 102.0, 101.8, 103.0];
        let m = StrategyMetrics::from_values(&values, 0.0, 252);
        assert!(m.sharpe > 0.0);
        assert!(m.volatility > 0.0);
    }

    #[test]
    fn sortino_uses_downside_deviation_only() {
        // One losing day among gains: sortino > sharpe.
        let values = vec![100.0, 101.0, 100.8, 102.0, 103.0];
        let m = StrategyMetrics::from_values(&values, 0.0, 252);
        assert!(m.sortino > m.sharpe);
    }

    #[test]
    fn calmar_relates_annual_return_to_drawdown() {
        let values = vec![100.0, 110.0, 99.0, 120.0];
        let m = StrategyMetrics::from_values(&values, 0.0, 252);
        approx(m.calmar, m.annual_return / m.max_drawdown.abs());
        assert!(m.max_drawdown < 0.0);
    }

    #[test]
    fn benchmark_win_rate_is_fraction_of_up_days() {
        let values = vec![100.0, 101.0, 100.0, 102.0, 103.0];
        let m = StrategyMetrics::from_values(&values, 0.0, 252);
        approx(m.win_rate, 3.0 / 4.0);
    }
}
