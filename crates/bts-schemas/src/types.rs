//! Order / trade wire types.
//!
//! These are `Serialize + Deserialize` so they travel in HTTP responses and
//! in persisted snapshots unchanged.  No business logic lives here.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Sides and order shapes
// ---------------------------------------------------------------------------

/// The client-visible instruction family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrustSide {
    Buy,
    Sell,
    MarketBuy,
    MarketSell,
    SellPercent,
    /// Synthetic corporate-action trade (dividend / split delta).
    Xdxr,
}

impl EntrustSide {
    /// Direction this instruction moves shares, ignoring the bid type.
    pub fn order_side(self) -> Option<OrderSide> {
        match self {
            Self::Buy | Self::MarketBuy => Some(OrderSide::Buy),
            Self::Sell | Self::MarketSell | Self::SellPercent => Some(OrderSide::Sell),
            Self::Xdxr => None,
        }
    }
}

/// Plain buy/sell direction the matcher works in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Limit vs market bid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidKind {
    Limit,
    Market,
}

/// Lifecycle of an accepted order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrustStatus {
    New,
    Filled,
    Partial,
    Rejected,
}

// ---------------------------------------------------------------------------
// Entrust
// ---------------------------------------------------------------------------

/// An order instruction as accepted (or rejected) by the counter.
///
/// Immutable once appended to the entrust log.  For `SellPercent`,
/// `shares_micros` holds the fraction in micros (1.0 = 1_000_000).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entrust {
    pub order_id: Uuid,
    pub symbol: String,
    pub side: EntrustSide,
    pub bid_kind: BidKind,
    /// Absent for market and XDXR instructions.
    pub price_micros: Option<i64>,
    pub shares_micros: i64,
    pub order_time: NaiveDateTime,
    pub status: EntrustStatus,
    /// Machine code of the rejection, when `status == Rejected`.
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// An executed fill (or synthetic XDXR record).
///
/// `shares_micros` may be fractional for sells and XDXR; buy fills are whole
/// multiples of 100 shares.  `eventual_profit_micros` is set on sell fills:
/// realized profit against the consumed lots' factor-rescaled cost basis,
/// net of the sell fee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub side: EntrustSide,
    pub shares_micros: i64,
    /// Weighted average across matched bars; bookkeeping value for XDXR.
    pub price_micros: i64,
    pub fee_micros: i64,
    pub trade_time: NaiveDateTime,
    pub eventual_profit_micros: Option<i64>,
}

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

/// Per-symbol position summary returned to clients.
///
/// Share counts are in the current adjustment frame (the real holding after
/// splits); `sellable_micros` excludes same-day acquisitions (T+1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: String,
    pub shares_micros: i64,
    /// Weighted average cost per current-frame share.
    pub cost_micros: i64,
    pub market_price_micros: i64,
    pub market_value_micros: i64,
    pub sellable_micros: i64,
}

/// One row of the daily mark-to-market table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetsRow {
    pub date: NaiveDate,
    pub assets_micros: i64,
}
