//! Suspension handling: trading the suspended symbol is refused, other
//! symbols stay tradable, valuation falls back to the last close within the
//! lookback and to cost basis beyond it.  The strict policy (any suspended
//! holding halts the whole account) is a config switch.

use std::sync::Arc;

use bts_broker::{Account, AccountMeta, TradePolicy};
use bts_feed::{Bar, PriceLimits, StaticFeed, TradingCalendar};
use bts_schemas::MICROS_SCALE;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

const M: i64 = MICROS_SCALE;
/// Trades every day.
const LIQUID: &str = "000001.XSHE";
/// Trades on day 1 only, then suspends.
const HALTED: &str = "600001.XSHG";

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, day).unwrap()
}

fn at(day: u32, hh: u32, mm: u32) -> NaiveDateTime {
    d(day).and_hms_opt(hh, mm, 0).unwrap()
}

fn minute_bar(day: u32, close: i64) -> Bar {
    Bar {
        time: at(day, 10, 0),
        open_micros: close,
        high_micros: close,
        low_micros: close,
        close_micros: close,
        volume_micros: 1_000_000 * M,
        factor_micros: M,
    }
}

fn limits(day: u32) -> PriceLimits {
    PriceLimits {
        date: d(day),
        upper_micros: 11_000_000,
        lower_micros: 9_000_000,
    }
}

fn fixture() -> Arc<StaticFeed> {
    let mut feed = StaticFeed::new().with_calendar(TradingCalendar::weekdays(d(1), d(31)));
    for day in 1u32..=10 {
        if matches!(d(day).weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        feed = feed
            .with_minute_bar(LIQUID, minute_bar(day, 10_000_000))
            .with_day_row(LIQUID, d(day), 10_000_000, 1_000_000 * M, M)
            .with_limits(LIQUID, limits(day))
            .with_limits(HALTED, limits(day));
    }
    // The halted symbol only ever traded on day 1: it fills intraday at
    // 9.50 and marks at a 10.00 close.
    feed = feed
        .with_minute_bar(HALTED, minute_bar(1, 9_500_000))
        .with_day_row(HALTED, d(1), 10_000_000, 1_000_000 * M, M);
    Arc::new(feed)
}

fn account(policy: TradePolicy) -> Account {
    Account::new(
        AccountMeta {
            name: "suspense".into(),
            token: "t-suspense".into(),
            principal_micros: 1_000_000 * M,
            commission_rate_micros: 0,
            start: d(1),
            end: d(10),
        },
        fixture(),
        policy,
    )
}

#[tokio::test]
async fn suspended_symbol_cannot_trade_but_others_can() {
    let acct = account(TradePolicy::default());
    acct.buy(HALTED, 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();

    // No bars on day 3 for the halted symbol.
    let err = acct
        .market_sell(HALTED, 1000 * M, at(3, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SUSPENDED");

    // The liquid symbol still trades on the same account.
    acct.buy(LIQUID, 10_500_000, 100 * M, at(3, 10, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn valuation_uses_last_close_within_lookback() {
    let acct = account(TradePolicy::default());
    acct.buy(HALTED, 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();
    acct.stop().await.unwrap();

    // Fill at 9.50 left 990,500 cash; every row marks the 1000 shares at
    // the last traded close (10.0).
    let rows = acct.assets(None, None).await;
    assert!(rows.len() >= 2);
    for row in &rows {
        assert_eq!(row.assets_micros, 1_000_500 * M);
    }
}

#[tokio::test]
async fn valuation_beyond_lookback_falls_back_to_cost() {
    // Lookback of one trading day: by day 3 the day-1 close is out of reach.
    let policy = TradePolicy {
        suspension_lookback_days: 1,
        ..TradePolicy::default()
    };
    let acct = account(policy);
    acct.buy(HALTED, 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();
    acct.stop().await.unwrap();

    let rows = acct.assets(None, None).await;
    // Day 2 still reaches the day-1 close (10.0)...
    assert_eq!(rows[1].assets_micros, 1_000_500 * M);
    // ...later days value the 1000 shares at the 9.50 cost basis instead.
    let last = rows.last().unwrap();
    assert_eq!(last.assets_micros, 990_500 * M + 9_500 * M);
}

#[tokio::test]
async fn strict_policy_blocks_all_trading_while_a_holding_is_suspended() {
    let policy = TradePolicy {
        halt_on_suspended_holding: true,
        ..TradePolicy::default()
    };
    let acct = account(policy);
    acct.buy(HALTED, 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();

    let err = acct
        .buy(LIQUID, 10_500_000, 100 * M, at(3, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SUSPENDED");
}
