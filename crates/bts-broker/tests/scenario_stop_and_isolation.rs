//! Session finalization and cross-account isolation.

use std::sync::Arc;

use bts_broker::{Account, AccountMeta, Registry, TradePolicy};
use bts_feed::{Bar, PriceLimits, StaticFeed, TradingCalendar};
use bts_schemas::MICROS_SCALE;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

const M: i64 = MICROS_SCALE;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, day).unwrap()
}

fn at(day: u32, hh: u32, mm: u32) -> NaiveDateTime {
    d(day).and_hms_opt(hh, mm, 0).unwrap()
}

fn with_symbol(mut feed: StaticFeed, symbol: &str, close: i64) -> StaticFeed {
    for day in 1u32..=15 {
        if matches!(d(day).weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        feed = feed
            .with_minute_bar(
                symbol,
                Bar {
                    time: at(day, 10, 0),
                    open_micros: close,
                    high_micros: close,
                    low_micros: close,
                    close_micros: close,
                    volume_micros: 1_000_000 * M,
                    factor_micros: M,
                },
            )
            .with_day_row(symbol, d(day), close, 1_000_000 * M, M)
            .with_limits(
                symbol,
                PriceLimits {
                    date: d(day),
                    upper_micros: close + 1_000_000,
                    lower_micros: close - 1_000_000,
                },
            );
    }
    feed
}

fn fixture() -> Arc<StaticFeed> {
    let feed = StaticFeed::new().with_calendar(TradingCalendar::weekdays(d(1), d(31)));
    let feed = with_symbol(feed, "000001.XSHE", 10_000_000);
    let feed = with_symbol(feed, "600000.XSHG", 20_000_000);
    Arc::new(feed)
}

fn meta(name: &str, token: &str) -> AccountMeta {
    AccountMeta {
        name: name.into(),
        token: token.into(),
        principal_micros: 1_000_000 * M,
        commission_rate_micros: 100,
        start: d(1),
        end: d(15),
    }
}

#[tokio::test]
async fn stop_forward_fills_assets_to_end_date() {
    let acct = Account::new(meta("stopper", "t-stop"), fixture(), TradePolicy::default());
    acct.buy("000001.XSHE", 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();
    acct.stop().await.unwrap();

    let rows = acct.assets(None, None).await;
    // Weekdays 2022-03-01 .. 2022-03-15 inclusive.
    assert_eq!(rows.len(), 11);
    assert_eq!(rows.last().unwrap().date, d(15));
    // Flat close: every row identical after the buy.
    let first = rows[0].assets_micros;
    assert!(rows.iter().all(|r| r.assets_micros == first));

    // stop() is idempotent.
    acct.stop().await.unwrap();
    assert_eq!(acct.assets(None, None).await.len(), 11);
}

#[tokio::test]
async fn metrics_before_any_trade_returns_zeros() {
    let acct = Account::new(meta("idle", "t-idle"), fixture(), TradePolicy::default());
    let report = acct.metrics(None).await.unwrap();
    assert_eq!(report.metrics.total_sells, 0);
    assert_eq!(report.metrics.total_return, 0.0);
    assert_eq!(report.metrics.sharpe, 0.0);
}

#[tokio::test]
async fn metrics_with_benchmark_compares_adjusted_closes() {
    let acct = Account::new(meta("bench", "t-bench"), fixture(), TradePolicy::default());
    acct.buy("000001.XSHE", 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();
    acct.stop().await.unwrap();

    let report = acct.metrics(Some("600000.XSHG")).await.unwrap();
    let baseline = report.baseline.expect("benchmark series present");
    // Flat benchmark: zero return, zero drawdown.
    assert_eq!(baseline.total_return, 0.0);
    assert_eq!(baseline.max_drawdown, 0.0);
}

#[tokio::test]
async fn interleaved_accounts_never_share_state() {
    let feed = fixture();
    let registry = Registry::new("admin");
    let a = registry
        .create(meta("alpha", "t-a"), feed.clone(), TradePolicy::default())
        .unwrap();
    let b = registry
        .create(meta("beta", "t-b"), feed.clone(), TradePolicy::default())
        .unwrap();

    // Interleave orders on disjoint symbols.
    a.buy("000001.XSHE", 10_500_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();
    b.buy("600000.XSHG", 20_500_000, 200 * M, at(1, 10, 0))
        .await
        .unwrap();
    a.market_sell("000001.XSHE", 1000 * M, at(2, 10, 0))
        .await
        .unwrap();
    b.market_sell("600000.XSHG", 200 * M, at(3, 10, 0))
        .await
        .unwrap();

    let bills_a = a.bills().await;
    let bills_b = b.bills().await;
    assert!(bills_a.trades.iter().all(|t| t.symbol == "000001.XSHE"));
    assert!(bills_b.trades.iter().all(|t| t.symbol == "600000.XSHG"));
    assert_eq!(bills_a.trades.len(), 2);
    assert_eq!(bills_b.trades.len(), 2);

    // Each ledger matches what a serial run would produce.
    let info_a = a.info(None).await.unwrap();
    assert_eq!(info_a.available_micros, 1_000_000 * M - 1_000_000 - 1_000_000);
    assert!(info_a.positions.is_empty());
}

#[tokio::test]
async fn concurrent_orders_on_one_account_serialize() {
    let acct = Arc::new(Account::new(
        meta("serial", "t-serial"),
        fixture(),
        TradePolicy::default(),
    ));

    // Two tasks race the same account; the lock admits them one at a time,
    // so exactly one of the equal-timestamp orders is accepted.
    let a1 = Arc::clone(&acct);
    let a2 = Arc::clone(&acct);
    let (r1, r2) = tokio::join!(
        async move { a1.buy("000001.XSHE", 10_500_000, 100 * M, at(1, 10, 0)).await },
        async move { a2.buy("000001.XSHE", 10_500_000, 100 * M, at(1, 10, 0)).await },
    );
    assert!(r1.is_ok() != r2.is_ok());
    let err = if r1.is_ok() { r2.unwrap_err() } else { r1.unwrap_err() };
    assert_eq!(err.code(), "TIME_REWIND");
}
