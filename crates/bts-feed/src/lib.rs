//! bts-feed
//!
//! The market-data boundary.  This crate defines the [`Feed`] trait the rest
//! of the counter consumes, the value types that cross it, a pure
//! [`TradingCalendar`], and three implementations:
//!
//! - [`FileFeed`] — CSV fixtures loaded into memory at startup
//! - [`StaticFeed`] — builder-style in-memory feed for tests
//! - [`FeedTimeout`] — decorator enforcing a deadline on every call
//!
//! # Feed data contract
//!
//! Each corporate action is represented exactly once: share-structure changes
//! (splits, reinvested distributions) through the adjustment factor, explicit
//! distributions through `dividend()`.  An event must never appear in both,
//! otherwise valuation would count it twice.

mod calendar;
mod file_feed;
mod static_feed;
mod timeout;
mod types;

use async_trait::async_trait;
use bts_schemas::BrokerError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub use calendar::TradingCalendar;
pub use file_feed::FileFeed;
pub use static_feed::StaticFeed;
pub use timeout::FeedTimeout;
pub use types::{Bar, Dividend, Frame, PriceLimits};

/// Session close for the markets this counter simulates (15:00).
pub fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 0, 0).expect("literal time")
}

/// Upstream market-data contract.
///
/// Object-safe so callers hold an `Arc<dyn Feed>`; every method may suspend
/// on network IO, so the whole surface is async.  Implementations must be
/// `Send + Sync`.
#[async_trait]
pub trait Feed: Send + Sync {
    /// Human-readable name identifying this feed (e.g. `"file"`).
    fn name(&self) -> &'static str;

    /// Bars for `symbol` in `[start, end]` at the given frame, in time order.
    ///
    /// Day-frame bars carry the day's adjustment factor; minute-frame bars
    /// carry factor 1.  An unknown symbol is an error; a known symbol with no
    /// bars in range (suspension) returns an empty vec.
    async fn bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frame: Frame,
    ) -> Result<Vec<Bar>, BrokerError>;

    /// Closing price on `date`, or `None` when the symbol did not trade.
    async fn close_price(&self, symbol: &str, date: NaiveDate)
        -> Result<Option<i64>, BrokerError>;

    /// The day's upper/lower price limits.
    async fn price_limits(&self, symbol: &str, date: NaiveDate)
        -> Result<PriceLimits, BrokerError>;

    /// Zero-or-one corporate-action distribution taking effect on `date`.
    async fn dividend(&self, symbol: &str, date: NaiveDate)
        -> Result<Option<Dividend>, BrokerError>;

    /// Cumulative adjustment factor on `date` (micros, 1.0 = 1_000_000).
    ///
    /// Flat across suspension gaps: the factor of the last traded day on or
    /// before `date` applies.
    async fn adjust_factor(&self, symbol: &str, date: NaiveDate) -> Result<i64, BrokerError>;

    /// All trading days in `[start, end]`, ascending.
    async fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, BrokerError>;

    /// Minute bars for matching: from `start` through the 15:00 session close
    /// of the same day.
    async fn match_bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
    ) -> Result<Vec<Bar>, BrokerError> {
        let end = start.date().and_time(session_close());
        self.bars(symbol, start, end, Frame::Min1).await
    }
}
