//! File-backed feed: CSV fixtures loaded into memory at startup.
//!
//! The deployment story for offline matching data: a directory of CSV files
//! is parsed once into a [`StaticFeed`] and served from memory.  Parsing is
//! hand-rolled — header map, then per-row field extraction with row-numbered
//! errors — so no float rounding enters at the boundary (prices stay decimal
//! strings until converted to micros).
//!
//! ## Directory contract
//!
//! | file | columns | required |
//! |------|---------|----------|
//! | `calendar.csv`     | `date`                                              | yes |
//! | `minute_bars.csv`  | `symbol,time,open,high,low,close,volume`            | yes |
//! | `day_bars.csv`     | `symbol,date,close,volume,factor`                   | yes |
//! | `price_limits.csv` | `symbol,date,upper,lower`                           | yes |
//! | `dividends.csv`    | `symbol,date,cash,share_ratio,new_share_ratio`      | no  |
//!
//! Columns are case-insensitive and order-independent.  `time` is
//! `YYYY-MM-DD HH:MM`, dates are `YYYY-MM-DD`, all numeric fields are decimal
//! strings.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use bts_schemas::{micros_from_str, BrokerError};
use chrono::{NaiveDate, NaiveDateTime};

use crate::static_feed::DayRow;
use crate::{Bar, Dividend, Feed, Frame, PriceLimits, StaticFeed, TradingCalendar};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while loading the fixture directory.
#[derive(Debug)]
pub enum FeedLoadError {
    /// A required file could not be read.
    Io { file: String, detail: String },
    /// The header row is missing a required column.
    MissingHeader { file: String, column: &'static str },
    /// A record field could not be parsed into the expected type.
    ParseField {
        file: String,
        row: usize,
        field: &'static str,
        raw: String,
    },
}

impl fmt::Display for FeedLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedLoadError::Io { file, detail } => write!(f, "{file}: io error: {detail}"),
            FeedLoadError::MissingHeader { file, column } => {
                write!(f, "{file}: missing required header column '{column}'")
            }
            FeedLoadError::ParseField {
                file,
                row,
                field,
                raw,
            } => write!(
                f,
                "{file} row {row}: cannot parse field '{field}' from value '{raw}'"
            ),
        }
    }
}

impl std::error::Error for FeedLoadError {}

// ---------------------------------------------------------------------------
// FileFeed
// ---------------------------------------------------------------------------

/// CSV-fixture feed; all lookups delegate to the in-memory [`StaticFeed`].
#[derive(Debug)]
pub struct FileFeed {
    inner: StaticFeed,
}

impl FileFeed {
    /// Load every fixture file under `dir`.
    pub fn load(dir: &Path) -> Result<Self, FeedLoadError> {
        let mut inner = StaticFeed::new();

        inner.set_calendar(TradingCalendar::new(load_calendar(&dir.join("calendar.csv"))?));

        for (symbol, bars) in load_minute_bars(&dir.join("minute_bars.csv"))? {
            inner.insert_minute_bars(symbol, bars);
        }
        for (symbol, rows) in load_day_rows(&dir.join("day_bars.csv"))? {
            inner.insert_day_rows(symbol, rows);
        }
        for (symbol, limits) in load_price_limits(&dir.join("price_limits.csv"))? {
            inner.insert_limits(symbol, limits);
        }

        let dividends_path = dir.join("dividends.csv");
        if dividends_path.exists() {
            for (symbol, dividends) in load_dividends(&dividends_path)? {
                inner.insert_dividends(symbol, dividends);
            }
        }

        tracing::info!(dir = %dir.display(), "file feed loaded");
        Ok(Self { inner })
    }
}

#[async_trait]
impl Feed for FileFeed {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frame: Frame,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.inner.bars(symbol, start, end, frame).await
    }

    async fn close_price(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<i64>, BrokerError> {
        self.inner.close_price(symbol, date).await
    }

    async fn price_limits(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<PriceLimits, BrokerError> {
        self.inner.price_limits(symbol, date).await
    }

    async fn dividend(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<Dividend>, BrokerError> {
        self.inner.dividend(symbol, date).await
    }

    async fn adjust_factor(&self, symbol: &str, date: NaiveDate) -> Result<i64, BrokerError> {
        self.inner.adjust_factor(symbol, date).await
    }

    async fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, BrokerError> {
        self.inner.trading_days(start, end).await
    }
}

// ---------------------------------------------------------------------------
// CSV machinery
// ---------------------------------------------------------------------------

/// A parsed CSV: lowercase header → column index, plus data rows.
struct CsvTable {
    file: String,
    header: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn read(path: &Path) -> Result<Self, FeedLoadError> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = std::fs::read_to_string(path).map_err(|e| FeedLoadError::Io {
            file: file.clone(),
            detail: e.to_string(),
        })?;

        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header_line = lines.next().unwrap_or("");
        let header = header_line
            .split(',')
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();
        let rows = lines
            .map(|l| l.split(',').map(|c| c.trim().to_string()).collect())
            .collect();

        Ok(Self { file, header, rows })
    }

    fn column(&self, name: &'static str) -> Result<usize, FeedLoadError> {
        self.header
            .get(name)
            .copied()
            .ok_or(FeedLoadError::MissingHeader {
                file: self.file.clone(),
                column: name,
            })
    }

    fn field<'a>(
        &'a self,
        row: usize,
        col: usize,
        name: &'static str,
    ) -> Result<&'a str, FeedLoadError> {
        self.rows[row]
            .get(col)
            .map(String::as_str)
            .ok_or_else(|| self.parse_err(row, name, ""))
    }

    fn parse_err(&self, row: usize, field: &'static str, raw: &str) -> FeedLoadError {
        FeedLoadError::ParseField {
            file: self.file.clone(),
            // +2: header line plus 1-based numbering.
            row: row + 2,
            field,
            raw: raw.to_string(),
        }
    }

    fn micros(&self, row: usize, col: usize, name: &'static str) -> Result<i64, FeedLoadError> {
        let raw = self.field(row, col, name)?;
        micros_from_str(raw).ok_or_else(|| self.parse_err(row, name, raw))
    }

    fn date(&self, row: usize, col: usize, name: &'static str) -> Result<NaiveDate, FeedLoadError> {
        let raw = self.field(row, col, name)?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| self.parse_err(row, name, raw))
    }

    fn datetime(
        &self,
        row: usize,
        col: usize,
        name: &'static str,
    ) -> Result<NaiveDateTime, FeedLoadError> {
        let raw = self.field(row, col, name)?;
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
            .map_err(|_| self.parse_err(row, name, raw))
    }
}

fn load_calendar(path: &Path) -> Result<Vec<NaiveDate>, FeedLoadError> {
    let table = CsvTable::read(path)?;
    let c_date = table.column("date")?;
    (0..table.rows.len())
        .map(|i| table.date(i, c_date, "date"))
        .collect()
}

fn load_minute_bars(path: &Path) -> Result<HashMap<String, Vec<Bar>>, FeedLoadError> {
    let table = CsvTable::read(path)?;
    let c_symbol = table.column("symbol")?;
    let c_time = table.column("time")?;
    let c_open = table.column("open")?;
    let c_high = table.column("high")?;
    let c_low = table.column("low")?;
    let c_close = table.column("close")?;
    let c_volume = table.column("volume")?;

    let mut out: HashMap<String, Vec<Bar>> = HashMap::new();
    for i in 0..table.rows.len() {
        let symbol = table.field(i, c_symbol, "symbol")?.to_string();
        out.entry(symbol).or_default().push(Bar {
            time: table.datetime(i, c_time, "time")?,
            open_micros: table.micros(i, c_open, "open")?,
            high_micros: table.micros(i, c_high, "high")?,
            low_micros: table.micros(i, c_low, "low")?,
            close_micros: table.micros(i, c_close, "close")?,
            volume_micros: table.micros(i, c_volume, "volume")?,
            factor_micros: bts_schemas::MICROS_SCALE,
        });
    }
    Ok(out)
}

fn load_day_rows(path: &Path) -> Result<HashMap<String, Vec<DayRow>>, FeedLoadError> {
    let table = CsvTable::read(path)?;
    let c_symbol = table.column("symbol")?;
    let c_date = table.column("date")?;
    let c_close = table.column("close")?;
    let c_volume = table.column("volume")?;
    let c_factor = table.column("factor")?;

    let mut out: HashMap<String, Vec<DayRow>> = HashMap::new();
    for i in 0..table.rows.len() {
        let symbol = table.field(i, c_symbol, "symbol")?.to_string();
        out.entry(symbol).or_default().push(DayRow {
            date: table.date(i, c_date, "date")?,
            close_micros: table.micros(i, c_close, "close")?,
            volume_micros: table.micros(i, c_volume, "volume")?,
            factor_micros: table.micros(i, c_factor, "factor")?,
        });
    }
    Ok(out)
}

fn load_price_limits(path: &Path) -> Result<HashMap<String, Vec<PriceLimits>>, FeedLoadError> {
    let table = CsvTable::read(path)?;
    let c_symbol = table.column("symbol")?;
    let c_date = table.column("date")?;
    let c_upper = table.column("upper")?;
    let c_lower = table.column("lower")?;

    let mut out: HashMap<String, Vec<PriceLimits>> = HashMap::new();
    for i in 0..table.rows.len() {
        let symbol = table.field(i, c_symbol, "symbol")?.to_string();
        out.entry(symbol).or_default().push(PriceLimits {
            date: table.date(i, c_date, "date")?,
            upper_micros: table.micros(i, c_upper, "upper")?,
            lower_micros: table.micros(i, c_lower, "lower")?,
        });
    }
    Ok(out)
}

fn load_dividends(path: &Path) -> Result<HashMap<String, Vec<Dividend>>, FeedLoadError> {
    let table = CsvTable::read(path)?;
    let c_symbol = table.column("symbol")?;
    let c_date = table.column("date")?;
    let c_cash = table.column("cash")?;
    let c_share = table.column("share_ratio")?;
    let c_new = table.column("new_share_ratio")?;

    let mut out: HashMap<String, Vec<Dividend>> = HashMap::new();
    for i in 0..table.rows.len() {
        let symbol = table.field(i, c_symbol, "symbol")?.to_string();
        out.entry(symbol).or_default().push(Dividend {
            date: table.date(i, c_date, "date")?,
            cash_micros_per_share: table.micros(i, c_cash, "cash")?,
            share_ratio_micros: table.micros(i, c_share, "share_ratio")?,
            new_share_ratio_micros: table.micros(i, c_new, "new_share_ratio")?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn fixture_dir() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_file(
            tmp.path(),
            "calendar.csv",
            "date\n2022-03-01\n2022-03-02\n2022-03-03\n",
        );
        write_file(
            tmp.path(),
            "minute_bars.csv",
            "symbol,time,open,high,low,close,volume\n\
             000001.XSHE,2022-03-01 09:31,9.78,9.82,9.77,9.80,100000\n\
             000001.XSHE,2022-03-01 09:40,9.79,9.81,9.78,9.80,100000\n",
        );
        write_file(
            tmp.path(),
            "day_bars.csv",
            "symbol,date,close,volume,factor\n000001.XSHE,2022-03-01,9.80,500000,1.0\n",
        );
        write_file(
            tmp.path(),
            "price_limits.csv",
            "symbol,date,upper,lower\n000001.XSHE,2022-03-01,10.78,8.82\n",
        );
        write_file(
            tmp.path(),
            "dividends.csv",
            "symbol,date,cash,share_ratio,new_share_ratio\n000001.XSHE,2022-03-02,0.5,0,0\n",
        );
        tmp
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn loads_and_serves_fixture_dir() {
        let tmp = fixture_dir();
        let feed = FileFeed::load(tmp.path()).unwrap();

        let days = feed.trading_days(d(2022, 3, 1), d(2022, 3, 3)).await.unwrap();
        assert_eq!(days.len(), 3);

        let bars = feed
            .match_bars(
                "000001.XSHE",
                d(2022, 3, 1).and_hms_opt(9, 31, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close_micros, 9_800_000);
        assert_eq!(bars[0].volume_micros, 100_000 * bts_schemas::MICROS_SCALE);

        let limits = feed
            .price_limits("000001.XSHE", d(2022, 3, 1))
            .await
            .unwrap();
        assert_eq!(limits.upper_micros, 10_780_000);

        let dv = feed
            .dividend("000001.XSHE", d(2022, 3, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dv.cash_micros_per_share, 500_000);
    }

    #[tokio::test]
    async fn missing_required_file_fails_loudly() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FileFeed::load(tmp.path()).unwrap_err();
        assert!(matches!(err, FeedLoadError::Io { .. }));
    }

    #[tokio::test]
    async fn bad_price_reports_row_and_field() {
        let tmp = fixture_dir();
        write_file(
            tmp.path(),
            "day_bars.csv",
            "symbol,date,close,volume,factor\n000001.XSHE,2022-03-01,not-a-price,500000,1.0\n",
        );
        let err = FileFeed::load(tmp.path()).unwrap_err();
        match err {
            FeedLoadError::ParseField { row, field, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "close");
            }
            other => panic!("expected ParseField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_header_column_is_reported() {
        let tmp = fixture_dir();
        write_file(tmp.path(), "price_limits.csv", "symbol,date,upper\n");
        let err = FileFeed::load(tmp.path()).unwrap_err();
        match err {
            FeedLoadError::MissingHeader { column, .. } => assert_eq!(column, "lower"),
            other => panic!("expected MissingHeader, got {other:?}"),
        }
    }
}
