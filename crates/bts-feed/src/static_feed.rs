//! In-memory feed backed by plain maps.
//!
//! The workhorse behind [`FileFeed`](crate::FileFeed) and every test suite:
//! data goes in through builder methods, lookups are pure map/slice work, and
//! the async trait methods never actually suspend.

use std::collections::HashMap;

use async_trait::async_trait;
use bts_schemas::{BrokerError, MICROS_SCALE};
use chrono::{NaiveDate, NaiveDateTime};

use crate::{session_close, Bar, Dividend, Feed, Frame, PriceLimits, TradingCalendar};

/// One daily row: close, traded volume, cumulative adjustment factor.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DayRow {
    pub date: NaiveDate,
    pub close_micros: i64,
    pub volume_micros: i64,
    pub factor_micros: i64,
}

/// Builder-style in-memory [`Feed`].
#[derive(Clone, Debug, Default)]
pub struct StaticFeed {
    calendar: Option<TradingCalendar>,
    minute_bars: HashMap<String, Vec<Bar>>,
    day_rows: HashMap<String, Vec<DayRow>>,
    limits: HashMap<String, HashMap<NaiveDate, PriceLimits>>,
    dividends: HashMap<String, HashMap<NaiveDate, Dividend>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the trading calendar (required before serving).
    pub fn with_calendar(mut self, calendar: TradingCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Append one minute bar; bars are kept sorted per symbol.
    pub fn with_minute_bar(mut self, symbol: &str, bar: Bar) -> Self {
        let bars = self.minute_bars.entry(symbol.to_string()).or_default();
        bars.push(bar);
        bars.sort_by_key(|b| b.time);
        self
    }

    /// Append one daily row (close + volume + factor).
    pub fn with_day_row(
        mut self,
        symbol: &str,
        date: NaiveDate,
        close_micros: i64,
        volume_micros: i64,
        factor_micros: i64,
    ) -> Self {
        let rows = self.day_rows.entry(symbol.to_string()).or_default();
        rows.push(DayRow {
            date,
            close_micros,
            volume_micros,
            factor_micros,
        });
        rows.sort_by_key(|r| r.date);
        self
    }

    /// Set the price band for one (symbol, date).
    pub fn with_limits(mut self, symbol: &str, limits: PriceLimits) -> Self {
        self.limits
            .entry(symbol.to_string())
            .or_default()
            .insert(limits.date, limits);
        self
    }

    /// Register a distribution event.
    pub fn with_dividend(mut self, symbol: &str, dividend: Dividend) -> Self {
        self.dividends
            .entry(symbol.to_string())
            .or_default()
            .insert(dividend.date, dividend);
        self
    }

    pub(crate) fn insert_minute_bars(&mut self, symbol: String, mut bars: Vec<Bar>) {
        bars.sort_by_key(|b| b.time);
        self.minute_bars.insert(symbol, bars);
    }

    pub(crate) fn insert_day_rows(&mut self, symbol: String, mut rows: Vec<DayRow>) {
        rows.sort_by_key(|r| r.date);
        self.day_rows.insert(symbol, rows);
    }

    pub(crate) fn insert_limits(&mut self, symbol: String, limits: Vec<PriceLimits>) {
        let map = self.limits.entry(symbol).or_default();
        for l in limits {
            map.insert(l.date, l);
        }
    }

    pub(crate) fn insert_dividends(&mut self, symbol: String, dividends: Vec<Dividend>) {
        let map = self.dividends.entry(symbol).or_default();
        for dv in dividends {
            map.insert(dv.date, dv);
        }
    }

    pub(crate) fn set_calendar(&mut self, calendar: TradingCalendar) {
        self.calendar = Some(calendar);
    }

    fn known(&self, symbol: &str) -> bool {
        self.minute_bars.contains_key(symbol) || self.day_rows.contains_key(symbol)
    }

    fn require_known(&self, symbol: &str) -> Result<(), BrokerError> {
        if self.known(symbol) {
            Ok(())
        } else {
            Err(BrokerError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
        }
    }

    fn calendar(&self) -> Result<&TradingCalendar, BrokerError> {
        self.calendar.as_ref().ok_or_else(|| BrokerError::FeedDataMissing {
            symbol: String::new(),
            detail: "no trading calendar loaded".to_string(),
        })
    }
}

#[async_trait]
impl Feed for StaticFeed {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frame: Frame,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.require_known(symbol)?;
        match frame {
            Frame::Min1 => {
                let bars = self.minute_bars.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
                Ok(bars
                    .iter()
                    .filter(|b| b.time >= start && b.time <= end)
                    .cloned()
                    .collect())
            }
            Frame::Day => {
                let rows = self.day_rows.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
                Ok(rows
                    .iter()
                    .filter(|r| r.date >= start.date() && r.date <= end.date())
                    .map(|r| Bar {
                        time: r.date.and_time(session_close()),
                        open_micros: r.close_micros,
                        high_micros: r.close_micros,
                        low_micros: r.close_micros,
                        close_micros: r.close_micros,
                        volume_micros: r.volume_micros,
                        factor_micros: r.factor_micros,
                    })
                    .collect())
            }
        }
    }

    async fn close_price(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<i64>, BrokerError> {
        self.require_known(symbol)?;
        let rows = self.day_rows.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .find(|r| r.date == date)
            .map(|r| r.close_micros))
    }

    async fn price_limits(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<PriceLimits, BrokerError> {
        self.require_known(symbol)?;
        self.limits
            .get(symbol)
            .and_then(|m| m.get(&date))
            .copied()
            .ok_or_else(|| BrokerError::FeedDataMissing {
                symbol: symbol.to_string(),
                detail: format!("no price limits on {date}"),
            })
    }

    async fn dividend(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<Dividend>, BrokerError> {
        self.require_known(symbol)?;
        Ok(self
            .dividends
            .get(symbol)
            .and_then(|m| m.get(&date))
            .copied())
    }

    async fn adjust_factor(&self, symbol: &str, date: NaiveDate) -> Result<i64, BrokerError> {
        self.require_known(symbol)?;
        let rows = self.day_rows.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        // Factor is flat across suspension gaps: last traded row on or before
        // `date` wins; before the first row the factor is 1.
        Ok(rows
            .iter()
            .rev()
            .find(|r| r.date <= date)
            .map(|r| r.factor_micros)
            .unwrap_or(MICROS_SCALE))
    }

    async fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, BrokerError> {
        Ok(self.calendar()?.between(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn minute_bar(y: i32, m: u32, day: u32, hh: u32, mm: u32, close: i64, vol: i64) -> Bar {
        Bar {
            time: d(y, m, day).and_hms_opt(hh, mm, 0).unwrap(),
            open_micros: close,
            high_micros: close,
            low_micros: close,
            close_micros: close,
            volume_micros: vol,
            factor_micros: MICROS_SCALE,
        }
    }

    fn feed() -> StaticFeed {
        StaticFeed::new()
            .with_calendar(TradingCalendar::weekdays(d(2022, 3, 1), d(2022, 3, 31)))
            .with_minute_bar("000001.XSHE", minute_bar(2022, 3, 1, 9, 31, 9_800_000, 100))
            .with_minute_bar("000001.XSHE", minute_bar(2022, 3, 1, 9, 40, 9_810_000, 200))
            .with_day_row("000001.XSHE", d(2022, 3, 1), 9_900_000, 1_000, MICROS_SCALE)
            .with_day_row(
                "000001.XSHE",
                d(2022, 3, 3),
                9_920_000,
                1_000,
                2 * MICROS_SCALE,
            )
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let err = feed()
            .close_price("999999.XSHE", d(2022, 3, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_SYMBOL");
    }

    #[tokio::test]
    async fn minute_bars_filter_by_range() {
        let start = d(2022, 3, 1).and_hms_opt(9, 35, 0).unwrap();
        let bars = feed().match_bars("000001.XSHE", start).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close_micros, 9_810_000);
    }

    #[tokio::test]
    async fn close_price_none_on_suspension_day() {
        // 2022-03-02 has no daily row: suspended.
        let px = feed()
            .close_price("000001.XSHE", d(2022, 3, 2))
            .await
            .unwrap();
        assert_eq!(px, None);
    }

    #[tokio::test]
    async fn adjust_factor_is_flat_across_gaps() {
        let f = feed();
        assert_eq!(
            f.adjust_factor("000001.XSHE", d(2022, 3, 2)).await.unwrap(),
            MICROS_SCALE
        );
        assert_eq!(
            f.adjust_factor("000001.XSHE", d(2022, 3, 4)).await.unwrap(),
            2 * MICROS_SCALE
        );
        // Before any row: factor 1.
        assert_eq!(
            f.adjust_factor("000001.XSHE", d(2022, 2, 1)).await.unwrap(),
            MICROS_SCALE
        );
    }

    #[tokio::test]
    async fn missing_limits_is_feed_data_missing() {
        let err = feed()
            .price_limits("000001.XSHE", d(2022, 3, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FEED_DATA_MISSING");
    }
}
