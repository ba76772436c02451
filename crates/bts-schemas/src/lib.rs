//! bts-schemas
//!
//! Shared domain vocabulary for the backtest counter:
//! - fixed-point scale and `i128`-safe arithmetic helpers
//! - order / trade wire types (entrusts, fills, position views)
//! - the error hierarchy with stable machine codes
//!
//! Pure deterministic logic — no IO, no time, no randomness.

mod error;
mod fixedpoint;
mod types;

pub use error::{BrokerError, ErrorBody, ErrorKind};
pub use fixedpoint::{micros_from_str, mul_div, mul_micros, round_lot_down, MICROS_SCALE};
pub use types::{
    AssetsRow, BidKind, Entrust, EntrustSide, EntrustStatus, OrderSide, PositionView, Trade,
};
