//! Partial fills, sell clamping, and sell_percent routing.

use std::sync::Arc;

use bts_broker::{Account, AccountMeta, TradePolicy};
use bts_feed::{Bar, PriceLimits, StaticFeed, TradingCalendar};
use bts_schemas::{EntrustSide, EntrustStatus, MICROS_SCALE};
use chrono::{NaiveDate, NaiveDateTime};

const M: i64 = MICROS_SCALE;
const SYMBOL: &str = "000001.XSHE";

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, day).unwrap()
}

fn at(day: u32, hh: u32, mm: u32) -> NaiveDateTime {
    d(day).and_hms_opt(hh, mm, 0).unwrap()
}

fn minute_bar(day: u32, hh: u32, mm: u32, close: i64, vol_shares: i64) -> Bar {
    Bar {
        time: at(day, hh, mm),
        open_micros: close,
        high_micros: close,
        low_micros: close,
        close_micros: close,
        volume_micros: vol_shares * M,
        factor_micros: M,
    }
}

fn limits(day: u32) -> PriceLimits {
    PriceLimits {
        date: d(day),
        upper_micros: 10_780_000,
        lower_micros: 8_820_000,
    }
}

fn fixture() -> Arc<StaticFeed> {
    Arc::new(
        StaticFeed::new()
            .with_calendar(TradingCalendar::weekdays(d(1), d(31)))
            // Day 1: the partial-fill ladder.
            .with_minute_bar(SYMBOL, minute_bar(1, 10, 0, 9_900_000, 3_000))
            .with_minute_bar(SYMBOL, minute_bar(1, 10, 1, 9_950_000, 4_000))
            .with_minute_bar(SYMBOL, minute_bar(1, 10, 2, 10_010_000, 1_000_000))
            // Day 2: deep liquidity for sells.
            .with_minute_bar(SYMBOL, minute_bar(2, 10, 0, 10_000_000, 1_000_000))
            .with_day_row(SYMBOL, d(1), 9_950_000, 500_000 * M, M)
            .with_day_row(SYMBOL, d(2), 10_000_000, 500_000 * M, M)
            .with_limits(SYMBOL, limits(1))
            .with_limits(SYMBOL, limits(2)),
    )
}

fn account() -> Account {
    Account::new(
        AccountMeta {
            name: "partial".into(),
            token: "t-partial".into(),
            principal_micros: 1_000_000 * M,
            commission_rate_micros: 100,
            start: d(1),
            end: d(31),
        },
        fixture(),
        TradePolicy::default(),
    )
}

#[tokio::test]
async fn volume_capped_buy_reports_partial() {
    let acct = account();
    let result = acct
        .buy(SYMBOL, 10_000_000, 10_000 * M, at(1, 10, 0))
        .await
        .unwrap();

    assert_eq!(result.entrust.status, EntrustStatus::Partial);
    assert_eq!(result.trade.shares_micros, 7_000 * M);
    // (9.9·3000 + 9.95·4000) / 7000
    assert_eq!(result.trade.price_micros, 9_928_571);

    let positions = acct.positions(None).await.unwrap();
    assert_eq!(positions[0].shares_micros, 7_000 * M);
}

#[tokio::test]
async fn sell_request_clamps_to_sellable() {
    let acct = account();
    acct.buy(SYMBOL, 10_000_000, 500 * M, at(1, 10, 0))
        .await
        .unwrap();

    // Asking for 1000 with 500 held sells the 500 and closes the position.
    let result = acct
        .market_sell(SYMBOL, 1000 * M, at(2, 10, 0))
        .await
        .unwrap();
    assert_eq!(result.trade.shares_micros, 500 * M);
    assert_eq!(result.entrust.status, EntrustStatus::Filled);
    assert!(acct.positions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn near_total_sell_sweeps_the_dust() {
    let acct = account();
    acct.buy(SYMBOL, 10_000_000, 500 * M, at(1, 10, 0))
        .await
        .unwrap();

    // 450 of 500 requested: the sub-lot remainder (50 < 100) goes too.
    let result = acct
        .market_sell(SYMBOL, 450 * M, at(2, 10, 0))
        .await
        .unwrap();
    assert_eq!(result.trade.shares_micros, 500 * M);
    assert!(acct.positions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn sell_percent_routes_as_market_sell_of_the_fraction() {
    let acct = account();
    acct.buy(SYMBOL, 10_000_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();

    // Half the holding; 500 of 1000 leaves 500 (no dust sweep at 500 ≥ 100).
    let result = acct
        .sell_percent(SYMBOL, M / 2, at(2, 10, 0))
        .await
        .unwrap();
    assert_eq!(result.entrust.side, EntrustSide::SellPercent);
    // The entrust records the fraction, the trade the resolved shares.
    assert_eq!(result.entrust.shares_micros, M / 2);
    assert_eq!(result.trade.shares_micros, 500 * M);

    let positions = acct.positions(None).await.unwrap();
    assert_eq!(positions[0].shares_micros, 500 * M);
}

#[tokio::test]
async fn buy_then_sell_same_price_costs_only_fees() {
    let acct = account();
    acct.market_buy(SYMBOL, 1000 * M, at(1, 10, 2))
        .await
        .unwrap();
    acct.market_sell(SYMBOL, 1000 * M, at(2, 10, 0))
        .await
        .unwrap();

    // Bought at 10.01, sold at 10.00: price delta −10, fees ~1.001 + 1.000.
    let info = acct.info(None).await.unwrap();
    let buy_fee = 1_001_000; // 10010 * 1e-4
    let sell_fee = 1_000_000; // 10000 * 1e-4
    assert_eq!(
        info.available_micros,
        1_000_000 * M - 10_010 * M - buy_fee + 10_000 * M - sell_fee
    );
}
