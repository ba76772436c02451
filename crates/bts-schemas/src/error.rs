//! The error hierarchy.
//!
//! Every failure the counter can hand back to a client belongs to one of four
//! kinds (bad parameter, trade rejection, account, infrastructure) and
//! carries a stable machine code.  Clients reconstruct the variant from the
//! code alone; the human message is informational.
//!
//! A rejected order never leaves partial state behind — callers only mutate
//! account state after every fallible step has succeeded.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// The four families of [`BrokerError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself is malformed (fixable by the caller).
    BadParameter,
    /// The order was understood but cannot execute against the market/account.
    TradeRejected,
    /// Token / account lifecycle problems.
    Account,
    /// The counter's own collaborators failed (feed, persistence).
    Infra,
}

// ---------------------------------------------------------------------------
// BrokerError
// ---------------------------------------------------------------------------

/// All client-visible failures.
#[derive(Clone, Debug, PartialEq)]
pub enum BrokerError {
    /// Buy quantity is not a positive multiple of 100 shares.
    LotSize { shares_micros: i64 },
    /// Order time is not strictly after the previous accepted order.
    TimeRewind {
        bid: NaiveDateTime,
        last: NaiveDateTime,
    },
    /// The feed has never heard of this symbol.
    UnknownSymbol { symbol: String },
    /// Unparseable or out-of-session datetime / date.
    BadDatetime { detail: String },

    /// Matched cost plus fee exceeds available cash.
    CashShortage {
        required_micros: i64,
        available_micros: i64,
    },
    /// Nothing sellable for this symbol at the order date (T+1 included).
    PositionShort { symbol: String, date: NaiveDate },
    /// Limit price never met by any bar after the order time.
    NoMatch { symbol: String, limit_micros: i64 },
    /// Bars matched on price but carried no volume.
    VolumeNotEnough { symbol: String },
    /// Every candidate bar sat at the adverse price limit.
    PriceLimit { symbol: String, date: NaiveDate },
    /// The symbol is suspended on the order date (or a held symbol blocks
    /// trading under the strict suspension policy).
    Suspended { symbol: String, date: NaiveDate },

    /// Token or name collides with an existing account.
    AccountExists { name: String },
    /// Orders arriving after `stop_backtest` froze the account.
    AccountStopped { end: NaiveDate },
    /// No such account / saved backtest.
    NotFound { name: String },
    /// Token does not map to any account (or lacks admin rights).
    Unauthorized,

    /// A feed call exceeded its deadline.
    FeedTimeout { op: String, timeout_secs: u64 },
    /// The feed has no data where data was required.
    FeedDataMissing { symbol: String, detail: String },
    /// The snapshot store failed.
    Persistence { detail: String },
}

impl BrokerError {
    /// Stable machine code; clients match on this to rebuild the variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LotSize { .. } => "LOT_SIZE",
            Self::TimeRewind { .. } => "TIME_REWIND",
            Self::UnknownSymbol { .. } => "UNKNOWN_SYMBOL",
            Self::BadDatetime { .. } => "BAD_DATETIME",
            Self::CashShortage { .. } => "CASH_SHORTAGE",
            Self::PositionShort { .. } => "POSITION_SHORT",
            Self::NoMatch { .. } => "NO_MATCH",
            Self::VolumeNotEnough { .. } => "VOLUME_NOT_ENOUGH",
            Self::PriceLimit { .. } => "PRICE_LIMIT",
            Self::Suspended { .. } => "SUSPENDED",
            Self::AccountExists { .. } => "ACCOUNT_EXISTS",
            Self::AccountStopped { .. } => "ACCOUNT_STOPPED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::FeedTimeout { .. } => "FEED_TIMEOUT",
            Self::FeedDataMissing { .. } => "FEED_DATA_MISSING",
            Self::Persistence { .. } => "PERSISTENCE",
        }
    }

    /// Which family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LotSize { .. }
            | Self::TimeRewind { .. }
            | Self::UnknownSymbol { .. }
            | Self::BadDatetime { .. } => ErrorKind::BadParameter,
            Self::CashShortage { .. }
            | Self::PositionShort { .. }
            | Self::NoMatch { .. }
            | Self::VolumeNotEnough { .. }
            | Self::PriceLimit { .. }
            | Self::Suspended { .. } => ErrorKind::TradeRejected,
            Self::AccountExists { .. }
            | Self::AccountStopped { .. }
            | Self::NotFound { .. }
            | Self::Unauthorized => ErrorKind::Account,
            Self::FeedTimeout { .. } | Self::FeedDataMissing { .. } | Self::Persistence { .. } => {
                ErrorKind::Infra
            }
        }
    }

    /// Wire form for the response envelope.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LotSize { shares_micros } => write!(
                f,
                "buy quantity must be a positive multiple of 100 shares, got {} micro-shares",
                shares_micros
            ),
            Self::TimeRewind { bid, last } => write!(
                f,
                "order time must increase strictly: {bid} is not after {last}"
            ),
            Self::UnknownSymbol { symbol } => write!(f, "unknown symbol: {symbol}"),
            Self::BadDatetime { detail } => write!(f, "bad datetime: {detail}"),
            Self::CashShortage {
                required_micros,
                available_micros,
            } => write!(
                f,
                "cash shortage: required {required_micros}, available {available_micros}"
            ),
            Self::PositionShort { symbol, date } => {
                write!(f, "no sellable position in {symbol} on {date}")
            }
            Self::NoMatch {
                symbol,
                limit_micros,
            } => write!(f, "{symbol} never reached limit price {limit_micros}"),
            Self::VolumeNotEnough { symbol } => {
                write!(f, "{symbol} matched on price but no volume traded")
            }
            Self::PriceLimit { symbol, date } => {
                write!(f, "{symbol} pinned at the price limit on {date}")
            }
            Self::Suspended { symbol, date } => write!(f, "{symbol} suspended on {date}"),
            Self::AccountExists { name } => write!(f, "account already exists: {name}"),
            Self::AccountStopped { end } => {
                write!(f, "backtest stopped; account frozen at {end}")
            }
            Self::NotFound { name } => write!(f, "not found: {name}"),
            Self::Unauthorized => write!(f, "invalid token"),
            Self::FeedTimeout { op, timeout_secs } => {
                write!(f, "feed call {op} timed out after {timeout_secs}s")
            }
            Self::FeedDataMissing { symbol, detail } => {
                write!(f, "feed data missing for {symbol}: {detail}")
            }
            Self::Persistence { detail } => write!(f, "persistence failure: {detail}"),
        }
    }
}

impl std::error::Error for BrokerError {}

// ---------------------------------------------------------------------------
// ErrorBody — wire form
// ---------------------------------------------------------------------------

/// Serializable error payload: `{ kind, code, message }`.
///
/// The code string is the contract; a client library maps it back to its own
/// typed error without parsing the message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}
