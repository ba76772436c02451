//! Lots and per-symbol positions.

use bts_schemas::{mul_div, mul_micros, PositionView, MICROS_SCALE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lot
// ---------------------------------------------------------------------------

/// One contiguous purchase tranche.
///
/// `shares_micros` is fixed in the acquisition frame; `cost_basis_micros` is
/// the per-share fill price in that same frame.  Corporate actions never
/// mutate a lot — stock distributions arrive as *new* lots and factor
/// arithmetic covers the rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub shares_micros: i64,
    pub cost_basis_micros: i64,
    pub acquired: NaiveDate,
    pub acquired_factor_micros: i64,
}

impl Lot {
    /// Real share count of this lot when the cumulative factor is `factor`.
    pub fn current_shares_micros(&self, factor_micros: i64) -> i64 {
        mul_div(self.shares_micros, factor_micros, self.acquired_factor_micros)
    }

    /// Cost per current-frame share when the cumulative factor is `factor`.
    pub fn effective_cost_micros(&self, factor_micros: i64) -> i64 {
        mul_div(self.cost_basis_micros, self.acquired_factor_micros, factor_micros)
    }
}

// ---------------------------------------------------------------------------
// SellFill
// ---------------------------------------------------------------------------

/// Result of FIFO-consuming a sell against a position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SellFill {
    /// Current-frame shares actually taken out of the position.
    pub consumed_micros: i64,
    /// `(price − effective_cost) · consumed` across the consumed lots,
    /// gross of fees (the account nets the fee off afterwards).
    pub gross_profit_micros: i64,
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// All lots of one symbol, FIFO ordered by acquisition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub lots: Vec<Lot>,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            lots: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Total real shares held when the cumulative factor is `factor`.
    pub fn current_shares_micros(&self, factor_micros: i64) -> i64 {
        self.lots
            .iter()
            .map(|l| l.current_shares_micros(factor_micros))
            .sum()
    }

    /// Sellable real shares on `date`: lots acquired before `date` (T+1).
    pub fn sellable_micros(&self, date: NaiveDate, factor_micros: i64) -> i64 {
        self.lots
            .iter()
            .filter(|l| l.acquired < date)
            .map(|l| l.current_shares_micros(factor_micros))
            .sum()
    }

    /// Record a buy fill as a fresh lot.
    pub fn apply_buy(
        &mut self,
        shares_micros: i64,
        price_micros: i64,
        date: NaiveDate,
        factor_micros: i64,
    ) {
        debug_assert!(shares_micros > 0);
        self.lots.push(Lot {
            shares_micros,
            cost_basis_micros: price_micros,
            acquired: date,
            acquired_factor_micros: factor_micros,
        });
    }

    /// FIFO-consume up to `shares_micros` (current frame) at `price`.
    ///
    /// Consumes only lots acquired before `date` (T+1); fully-consumed lots
    /// are dropped and sub-micro remainders are treated as zero.  Returns
    /// what was actually consumed and the gross realized profit against the
    /// factor-rescaled cost basis.
    pub fn apply_sell(
        &mut self,
        shares_micros: i64,
        price_micros: i64,
        date: NaiveDate,
        factor_micros: i64,
    ) -> SellFill {
        let mut remaining = shares_micros;
        let mut gross_profit: i128 = 0;

        for lot in self.lots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if lot.acquired >= date {
                continue;
            }
            let lot_cur = lot.current_shares_micros(factor_micros);
            if lot_cur <= 0 {
                lot.shares_micros = 0;
                continue;
            }
            let take = remaining.min(lot_cur);
            let effective_cost = lot.effective_cost_micros(factor_micros);
            gross_profit +=
                (take as i128) * ((price_micros - effective_cost) as i128) / (MICROS_SCALE as i128);

            if take == lot_cur {
                lot.shares_micros = 0;
            } else {
                let back = mul_div(take, lot.acquired_factor_micros, factor_micros);
                lot.shares_micros = (lot.shares_micros - back).max(0);
            }
            remaining -= take;
        }

        self.lots.retain(|l| l.shares_micros > 0);

        SellFill {
            consumed_micros: shares_micros - remaining,
            gross_profit_micros: clamp_i128(gross_profit),
        }
    }

    /// Mark-to-market value with a known close and factor.
    pub fn market_value_micros(&self, close_micros: i64, factor_micros: i64) -> i64 {
        self.lots
            .iter()
            .map(|l| mul_micros(l.current_shares_micros(factor_micros), close_micros))
            .sum()
    }

    /// Fallback value when no usable close exists: what was paid.
    pub fn cost_value_micros(&self) -> i64 {
        self.lots
            .iter()
            .map(|l| mul_micros(l.shares_micros, l.cost_basis_micros))
            .sum()
    }

    /// Client-facing summary on `date`.
    ///
    /// `market_price_micros` is the valuation price the caller settled on
    /// (close, last close before a suspension, or cost fallback).
    pub fn snapshot(
        &self,
        date: NaiveDate,
        market_price_micros: i64,
        factor_micros: i64,
    ) -> PositionView {
        let shares = self.current_shares_micros(factor_micros);
        let paid = self.cost_value_micros();
        let cost = if shares > 0 {
            mul_div(paid, MICROS_SCALE, shares)
        } else {
            0
        };
        PositionView {
            symbol: self.symbol.clone(),
            shares_micros: shares,
            cost_micros: cost,
            market_price_micros,
            market_value_micros: mul_micros(shares, market_price_micros),
            sellable_micros: self.sellable_micros(date, factor_micros),
        }
    }
}

fn clamp_i128(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
