//! Corporate-action application.
//!
//! One dividend/split event on one held symbol becomes one synthetic XDXR
//! trade: the cash component credits the account, the stock component lands
//! as a zero-cost lot acquired on the event date (sellable from the next
//! day, like any acquisition).  Raw lot share counts are never rewritten —
//! the adjustment factor carries the valuation arithmetic, which is what
//! keeps NAV continuous across the event.

use bts_feed::Dividend;
use bts_portfolio::Position;
use bts_schemas::{mul_micros, EntrustSide, Trade};
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

/// Cash and share deltas of one applied event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct XdxrOutcome {
    pub cash_delta_micros: i64,
    pub trade: Trade,
}

/// Apply `ev` to `position` as of `date`.
///
/// `factor_micros` is the cumulative adjustment factor on `date`; the event
/// scales off the *current-frame* holding.  Returns `None` when the holding
/// is empty or the event carries nothing.
pub(crate) fn apply_event(
    position: &mut Position,
    ev: &Dividend,
    factor_micros: i64,
    date: NaiveDate,
) -> Option<XdxrOutcome> {
    let held_micros = position.current_shares_micros(factor_micros);
    if held_micros <= 0 || ev.is_empty() {
        return None;
    }

    let cash_delta = mul_micros(held_micros, ev.cash_micros_per_share);
    let stock_micros = mul_micros(held_micros, ev.stock_ratio_micros());
    if stock_micros > 0 {
        position.apply_buy(stock_micros, 0, date, factor_micros);
    }

    let trade = Trade {
        trade_id: Uuid::new_v4(),
        order_id: Uuid::nil(),
        symbol: position.symbol.clone(),
        side: EntrustSide::Xdxr,
        shares_micros: stock_micros,
        // Bookkeeping: the per-share cash component of the event.
        price_micros: ev.cash_micros_per_share,
        fee_micros: 0,
        trade_time: date.and_time(NaiveTime::from_hms_opt(15, 0, 0).expect("literal time")),
        eventual_profit_micros: None,
    };

    Some(XdxrOutcome {
        cash_delta_micros: cash_delta,
        trade,
    })
}
