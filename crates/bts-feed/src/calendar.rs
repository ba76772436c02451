//! Trading-day calendar.
//!
//! Deterministic, pure logic.  No IO, no wall-clock, no randomness.
//!
//! All date arithmetic in the counter ("next trading day", "N trading days
//! ago") routes through a calendar instance supplied by the feed — never
//! through civil-calendar math, because suspensions, holidays, and weekends
//! would silently skew every window otherwise.

use chrono::{Datelike, NaiveDate, Weekday};

/// A sorted, deduplicated list of trading days with binary-search lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build from an arbitrary day list; sorts and deduplicates.
    pub fn new(mut days: Vec<NaiveDate>) -> Self {
        days.sort_unstable();
        days.dedup();
        Self { days }
    }

    /// Weekday generator for fixtures: every Monday–Friday in `[start, end]`.
    ///
    /// Real deployments load the exchange calendar from data; tests and small
    /// fixtures are fine with weekdays.
    pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Self {
        let mut days = Vec::new();
        let mut d = start;
        while d <= end {
            if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                days.push(d);
            }
            match d.succ_opt() {
                Some(n) => d = n,
                None => break,
            }
        }
        Self { days }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }

    /// `true` if `date` is a trading day.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.binary_search(&date).is_ok()
    }

    /// All trading days in `[start, end]`, ascending.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        self.days[lo..hi].to_vec()
    }

    /// The last trading day strictly before `date`.
    pub fn prev(&self, date: NaiveDate) -> Option<NaiveDate> {
        let i = self.days.partition_point(|d| *d < date);
        i.checked_sub(1).map(|i| self.days[i])
    }

    /// The first trading day strictly after `date`.
    pub fn next(&self, date: NaiveDate) -> Option<NaiveDate> {
        let i = self.days.partition_point(|d| *d <= date);
        self.days.get(i).copied()
    }

    /// Number of trading days in `[start, end]`.
    pub fn count(&self, start: NaiveDate, end: NaiveDate) -> usize {
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        hi - lo
    }
}
