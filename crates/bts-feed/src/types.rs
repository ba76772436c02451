//! Value types crossing the feed boundary.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Bar granularity the counter understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// One-minute bars (the matching stream).
    Min1,
    /// Daily bars (valuation and benchmarks).
    Day,
}

/// One OHLCV bar.
///
/// Prices in micros; `volume_micros` is the traded share count in share
/// micros.  `factor_micros` is the day's cumulative adjustment factor for
/// `Frame::Day` bars and 1.0 for minute bars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    pub volume_micros: i64,
    pub factor_micros: i64,
}

/// Regulated daily price band for one symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLimits {
    pub date: NaiveDate,
    pub upper_micros: i64,
    pub lower_micros: i64,
}

/// One ex-dividend / ex-rights distribution.
///
/// `cash_micros_per_share` is paid per current-frame share held;
/// `share_ratio_micros` and `new_share_ratio_micros` are per-share bonus and
/// conversion ratios (micros, 0.3 = 300_000).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dividend {
    pub date: NaiveDate,
    pub cash_micros_per_share: i64,
    pub share_ratio_micros: i64,
    pub new_share_ratio_micros: i64,
}

impl Dividend {
    /// Combined share multiplier of the stock component (micros).
    pub fn stock_ratio_micros(&self) -> i64 {
        self.share_ratio_micros + self.new_share_ratio_micros
    }

    /// `true` when the event carries neither cash nor shares.
    pub fn is_empty(&self) -> bool {
        self.cash_micros_per_share == 0 && self.stock_ratio_micros() == 0
    }
}
