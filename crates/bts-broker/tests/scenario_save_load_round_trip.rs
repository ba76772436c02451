//! Snapshot round trip: an account restored from its persisted snapshot
//! answers every read endpoint identically to the original.

use std::sync::Arc;

use bts_broker::{Account, AccountMeta, AccountSnapshot, FileStore, SnapshotStore, TradePolicy};
use bts_feed::{Bar, PriceLimits, StaticFeed, TradingCalendar};
use bts_schemas::MICROS_SCALE;
use chrono::{NaiveDate, NaiveDateTime};

const M: i64 = MICROS_SCALE;
const SYMBOL: &str = "000001.XSHE";

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, day).unwrap()
}

fn at(day: u32, hh: u32, mm: u32) -> NaiveDateTime {
    d(day).and_hms_opt(hh, mm, 0).unwrap()
}

fn fixture() -> Arc<StaticFeed> {
    let mut feed = StaticFeed::new().with_calendar(TradingCalendar::weekdays(d(1), d(31)));
    for day in [1u32, 2, 3, 4] {
        feed = feed
            .with_minute_bar(
                SYMBOL,
                Bar {
                    time: at(day, 10, 0),
                    open_micros: 9_800_000,
                    high_micros: 9_800_000,
                    low_micros: 9_800_000,
                    close_micros: 9_800_000,
                    volume_micros: 1_000_000 * M,
                    factor_micros: M,
                },
            )
            .with_day_row(SYMBOL, d(day), 9_800_000, 1_000_000 * M, M)
            .with_limits(
                SYMBOL,
                PriceLimits {
                    date: d(day),
                    upper_micros: 10_780_000,
                    lower_micros: 8_820_000,
                },
            );
    }
    Arc::new(feed)
}

async fn traded_account(feed: Arc<StaticFeed>) -> Account {
    let acct = Account::new(
        AccountMeta {
            name: "roundtrip".into(),
            token: "t-roundtrip".into(),
            principal_micros: 1_000_000 * M,
            commission_rate_micros: 100,
            start: d(1),
            end: d(4),
        },
        feed,
        TradePolicy::default(),
    );
    acct.buy(SYMBOL, 10_000_000, 1000 * M, at(1, 10, 0))
        .await
        .unwrap();
    acct.sell(SYMBOL, 9_000_000, 400 * M, at(2, 10, 0))
        .await
        .unwrap();
    acct
}

#[tokio::test]
async fn restored_account_matches_all_read_views() {
    let feed = fixture();
    let original = traded_account(Arc::clone(&feed)).await;

    let snap = original.snapshot("round trip check").await;
    let blob = serde_json::to_vec(&snap).unwrap();
    let back: AccountSnapshot = serde_json::from_slice(&blob).unwrap();
    let restored = Account::from_snapshot(back, feed, TradePolicy::default());

    assert_eq!(
        original.info(None).await.unwrap(),
        restored.info(None).await.unwrap()
    );
    assert_eq!(
        original.positions(None).await.unwrap(),
        restored.positions(None).await.unwrap()
    );
    assert_eq!(original.bills().await, restored.bills().await);
    assert_eq!(
        original.assets(None, None).await,
        restored.assets(None, None).await
    );
    assert_eq!(
        original.metrics(None).await.unwrap(),
        restored.metrics(None).await.unwrap()
    );
}

#[tokio::test]
async fn restored_account_keeps_trading_where_it_left_off() {
    let feed = fixture();
    let original = traded_account(Arc::clone(&feed)).await;
    let snap = original.snapshot("").await;
    let restored = Account::from_snapshot(snap, feed, TradePolicy::default());

    // Time rewind survives the round trip.
    let err = restored
        .buy(SYMBOL, 10_000_000, 100 * M, at(2, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TIME_REWIND");

    // Forward orders still work.
    restored
        .buy(SYMBOL, 10_000_000, 100 * M, at(3, 10, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn snapshot_blob_travels_through_the_file_store() {
    let feed = fixture();
    let original = traded_account(Arc::clone(&feed)).await;
    let snap = original.snapshot("stored").await;

    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path());
    store
        .save("roundtrip", &serde_json::to_vec(&snap).unwrap())
        .await
        .unwrap();

    let bytes = store.load("roundtrip").await.unwrap().unwrap();
    let back: AccountSnapshot = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(back, snap);
}
