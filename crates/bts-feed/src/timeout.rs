//! Deadline decorator for feed calls.
//!
//! Any feed call may hang on the network; the account lock is held across
//! those suspension points, so a stuck call would freeze the whole account.
//! `FeedTimeout` wraps an inner feed and converts elapsed deadlines into
//! `FEED_TIMEOUT`, leaving account state untouched (the caller only commits
//! after every feed call has returned).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bts_schemas::BrokerError;
use chrono::{NaiveDate, NaiveDateTime};

use crate::{Bar, Dividend, Feed, Frame, PriceLimits};

/// [`Feed`] wrapper applying `tokio::time::timeout` to every call.
pub struct FeedTimeout {
    inner: Arc<dyn Feed>,
    timeout: Duration,
}

impl FeedTimeout {
    /// Default deadline for feed calls.
    pub const DEFAULT_SECS: u64 = 30;

    pub fn new(inner: Arc<dyn Feed>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn deadline<T, F>(&self, op: &str, fut: F) -> Result<T, BrokerError>
    where
        F: Future<Output = Result<T, BrokerError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_secs = self.timeout.as_secs(), "feed call timed out");
                Err(BrokerError::FeedTimeout {
                    op: op.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl Feed for FeedTimeout {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frame: Frame,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.deadline("bars", self.inner.bars(symbol, start, end, frame))
            .await
    }

    async fn close_price(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<i64>, BrokerError> {
        self.deadline("close_price", self.inner.close_price(symbol, date))
            .await
    }

    async fn price_limits(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<PriceLimits, BrokerError> {
        self.deadline("price_limits", self.inner.price_limits(symbol, date))
            .await
    }

    async fn dividend(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<Dividend>, BrokerError> {
        self.deadline("dividend", self.inner.dividend(symbol, date))
            .await
    }

    async fn adjust_factor(&self, symbol: &str, date: NaiveDate) -> Result<i64, BrokerError> {
        self.deadline("adjust_factor", self.inner.adjust_factor(symbol, date))
            .await
    }

    async fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, BrokerError> {
        self.deadline("trading_days", self.inner.trading_days(start, end))
            .await
    }
}
