//! bts-match
//!
//! The matching engine: a pure function from an order request plus a minute
//! bar stream to a fill decision.  Deterministic — no IO, no time, no
//! randomness; the caller supplies the bars and the day's price limits.
//!
//! # Rules
//!
//! 1. The first bar considered is the one at `order_time`.  For orders placed
//!    at or before 09:31 the opening bar's `open` substitutes for its `close`
//!    (supports "buy at next-day open" strategies).
//! 2. Bars pinned at the adverse limit (upper for a buy, lower for a sell)
//!    are uncrossable one-sided markets and are discarded.  If nothing
//!    remains the order fails `PRICE_LIMIT`.
//! 3. Limit orders keep only bars crossing the limit price; market orders
//!    take any bar surviving step 2.  Nothing crossing → `NO_MATCH`.
//! 4. A bar pinned at the *favorable* limit offers unbounded volume (the
//!    queue on the other side is infinite there).
//! 5. Volume is consumed bar by bar, in feed order, up to each bar's volume;
//!    buy fills settle in whole 100-share lots.  Bars that match on price but
//!    carry zero volume in total → `VOLUME_NOT_ENOUGH`.
//! 6. Fill price is the volume-weighted average over consumed bars; fill time
//!    is the frame of the last consumed bar.

use bts_feed::{Bar, PriceLimits};
use bts_schemas::{round_lot_down, BidKind, BrokerError, OrderSide};
use chrono::{NaiveDateTime, NaiveTime};

/// Volume sentinel for bars trading at the favorable limit.
const UNBOUNDED_VOLUME: i64 = i64::MAX;

/// What the account asks the matcher to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub bid_kind: BidKind,
    /// Required for `BidKind::Limit`, ignored for market orders.
    pub limit_micros: Option<i64>,
    /// Requested quantity in share micros.
    pub shares_micros: i64,
    pub order_time: NaiveDateTime,
}

/// A successful (possibly partial) fill decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchFill {
    /// Filled quantity in share micros (`≤ shares_micros` requested).
    pub filled_micros: i64,
    /// Volume-weighted average price in micros.
    pub avg_price_micros: i64,
    /// Frame of the last bar that contributed volume.
    pub fill_time: NaiveDateTime,
}

impl MatchFill {
    /// `true` when the request was only partially satisfied.
    pub fn is_partial(&self, requested_micros: i64) -> bool {
        self.filled_micros < requested_micros
    }
}

/// Latest order time that still trades against the opening bar's `open`.
fn open_cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 31, 0).expect("literal time")
}

/// Match `req` against `bars` (minute bars from `order_time` through session
/// close) under the day's `limits`.
///
/// # Errors
/// `SUSPENDED` on an empty bar stream, `PRICE_LIMIT` / `NO_MATCH` /
/// `VOLUME_NOT_ENOUGH` per the rules above.
pub fn match_order(
    req: &MatchRequest,
    bars: &[Bar],
    limits: &PriceLimits,
) -> Result<MatchFill, BrokerError> {
    debug_assert!(req.shares_micros > 0, "requested shares must be positive");

    if bars.is_empty() {
        return Err(BrokerError::Suspended {
            symbol: req.symbol.clone(),
            date: req.order_time.date(),
        });
    }

    let use_open = req.order_time.time() <= open_cutoff();

    let (adverse, favorable) = match req.side {
        OrderSide::Buy => (limits.upper_micros, limits.lower_micros),
        OrderSide::Sell => (limits.lower_micros, limits.upper_micros),
    };

    // (price, volume, time) triples surviving the adverse-limit cut.
    let mut queue: Vec<(i64, i64, NaiveDateTime)> = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let price = if i == 0 && use_open {
            bar.open_micros
        } else {
            bar.close_micros
        };
        if price == adverse {
            continue;
        }
        let volume = if price == favorable {
            UNBOUNDED_VOLUME
        } else {
            bar.volume_micros
        };
        queue.push((price, volume, bar.time));
    }
    if queue.is_empty() {
        return Err(BrokerError::PriceLimit {
            symbol: req.symbol.clone(),
            date: req.order_time.date(),
        });
    }

    if req.bid_kind == BidKind::Limit {
        let limit = req.limit_micros.unwrap_or(adverse);
        queue.retain(|(price, _, _)| match req.side {
            OrderSide::Buy => *price <= limit,
            OrderSide::Sell => *price >= limit,
        });
        if queue.is_empty() {
            return Err(BrokerError::NoMatch {
                symbol: req.symbol.clone(),
                limit_micros: limit,
            });
        }
    }

    // First pass: how much can fill at all.
    let mut available: i128 = 0;
    for (_, volume, _) in &queue {
        available = available.saturating_add(*volume as i128);
        if available >= req.shares_micros as i128 {
            available = req.shares_micros as i128;
            break;
        }
    }
    let mut filled = available as i64;
    if req.side == OrderSide::Buy {
        filled = round_lot_down(filled);
    }
    if filled == 0 {
        return Err(BrokerError::VolumeNotEnough {
            symbol: req.symbol.clone(),
        });
    }

    // Second pass: consume exactly `filled` in feed order.
    let mut remaining = filled;
    let mut money: i128 = 0;
    let mut fill_time = queue[0].2;
    for (price, volume, time) in &queue {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(*volume);
        money += (take as i128) * (*price as i128);
        remaining -= take;
        fill_time = *time;
    }
    debug_assert_eq!(remaining, 0);

    let avg_price_micros = (money / (filled as i128)) as i64;
    Ok(MatchFill {
        filled_micros: filled,
        avg_price_micros,
        fill_time,
    })
}
