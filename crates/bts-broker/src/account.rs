//! One simulated account: order intake, matching, commit, daily assets.
//!
//! Every mutating operation locks the account for its full duration,
//! including feed IO — the strict-monotone-time invariant and the assets
//! table's consistency with the ledger depend on that.  A failed order
//! leaves the account unchanged: every fallible step (validation, corporate
//! action staging, feed lookups, matching, valuation prefetch) completes
//! before the first ledger mutation of the order itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use bts_feed::{Feed, Frame};
use bts_match::{match_order, MatchRequest};
use bts_metrics::StrategyMetrics;
use bts_portfolio::Position;
use bts_schemas::{
    mul_div, mul_micros, round_lot_down, AssetsRow, BidKind, BrokerError, Entrust, EntrustSide,
    EntrustStatus, OrderSide, PositionView, Trade, MICROS_SCALE,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::xdxr;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Immutable account identity and session parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub name: String,
    pub token: String,
    pub principal_micros: i64,
    /// Flat commission rate in micros (1e-4 = 100).
    pub commission_rate_micros: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Process-wide trading policy knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct TradePolicy {
    pub rf_annual: f64,
    pub annual_days: u32,
    /// Valuation lookback for suspended symbols, in trading days.
    pub suspension_lookback_days: u32,
    /// Strict rule: any suspended holding blocks all trading on the account.
    pub halt_on_suspended_holding: bool,
}

impl Default for TradePolicy {
    fn default() -> Self {
        Self {
            rf_annual: 0.03,
            annual_days: 252,
            suspension_lookback_days: 500,
            halt_on_suspended_holding: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read-only account summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub name: String,
    pub principal_micros: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub stopped: bool,
    pub last_trade: Option<NaiveDateTime>,
    pub assets_micros: i64,
    pub available_micros: i64,
    pub market_value_micros: i64,
    pub pnl_micros: i64,
    pub ppnl: f64,
    pub positions: Vec<PositionView>,
}

/// The entrust and trade logs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillsView {
    pub entrusts: Vec<Entrust>,
    pub trades: Vec<Trade>,
}

/// Metrics block plus session framing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Days the assets series spans.
    pub window: u32,
    pub metrics: StrategyMetrics,
    pub baseline: Option<StrategyMetrics>,
}

/// Outcome of an accepted order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub entrust: Entrust,
    pub trade: Trade,
}

/// Full persisted state of one account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub name: String,
    pub token: String,
    pub principal_micros: i64,
    pub commission_rate_micros: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub description: String,
    pub cash_micros: i64,
    pub positions: Vec<Position>,
    pub entrusts: Vec<Entrust>,
    pub trades: Vec<Trade>,
    pub assets: Vec<AssetsRow>,
    pub last_order_time: Option<NaiveDateTime>,
    pub xdxr_cursor: NaiveDate,
    pub stopped: bool,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct AccountState {
    cash_micros: i64,
    positions: BTreeMap<String, Position>,
    entrusts: Vec<Entrust>,
    trades: Vec<Trade>,
    assets: BTreeMap<NaiveDate, i64>,
    last_order_time: Option<NaiveDateTime>,
    /// Last date through which corporate actions and assets rows ran.
    xdxr_cursor: NaiveDate,
    stopped: bool,
}

/// Valuation inputs for one date: symbol → (usable price, factor).
/// Price `None` means the cost-basis fallback applies.
type Marks = BTreeMap<String, (Option<i64>, i64)>;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

pub struct Account {
    meta: AccountMeta,
    policy: TradePolicy,
    feed: Arc<dyn Feed>,
    state: Mutex<AccountState>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("meta", &self.meta)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}

impl Account {
    pub fn new(meta: AccountMeta, feed: Arc<dyn Feed>, policy: TradePolicy) -> Self {
        let state = AccountState {
            cash_micros: meta.principal_micros,
            positions: BTreeMap::new(),
            entrusts: Vec::new(),
            trades: Vec::new(),
            assets: BTreeMap::new(),
            last_order_time: None,
            xdxr_cursor: meta.start,
            stopped: false,
        };
        Self {
            meta,
            policy,
            feed,
            state: Mutex::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn token(&self) -> &str {
        &self.meta.token
    }

    pub fn meta(&self) -> &AccountMeta {
        &self.meta
    }

    // -----------------------------------------------------------------------
    // Trading operations
    // -----------------------------------------------------------------------

    pub async fn buy(
        &self,
        symbol: &str,
        price_micros: i64,
        shares_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        self.place(
            symbol,
            EntrustSide::Buy,
            Some(price_micros),
            shares_micros,
            order_time,
        )
        .await
    }

    pub async fn market_buy(
        &self,
        symbol: &str,
        shares_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        self.place(symbol, EntrustSide::MarketBuy, None, shares_micros, order_time)
            .await
    }

    pub async fn sell(
        &self,
        symbol: &str,
        price_micros: i64,
        shares_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        self.place(
            symbol,
            EntrustSide::Sell,
            Some(price_micros),
            shares_micros,
            order_time,
        )
        .await
    }

    pub async fn market_sell(
        &self,
        symbol: &str,
        shares_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        self.place(symbol, EntrustSide::MarketSell, None, shares_micros, order_time)
            .await
    }

    /// Sell a fraction (micros, in `(0, 1]`) of the current holding.
    pub async fn sell_percent(
        &self,
        symbol: &str,
        percent_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        self.place(
            symbol,
            EntrustSide::SellPercent,
            None,
            percent_micros,
            order_time,
        )
        .await
    }

    async fn place(
        &self,
        symbol: &str,
        side: EntrustSide,
        price_micros: Option<i64>,
        qty_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        let mut st = self.state.lock().await;
        let result = self
            .place_locked(&mut st, symbol, side, price_micros, qty_micros, order_time)
            .await;

        if let Err(err) = &result {
            // Rejections still land in the entrust log with their reason.
            st.entrusts.push(Entrust {
                order_id: Uuid::new_v4(),
                symbol: symbol.to_string(),
                side,
                bid_kind: if price_micros.is_some() {
                    BidKind::Limit
                } else {
                    BidKind::Market
                },
                price_micros,
                shares_micros: qty_micros,
                order_time,
                status: EntrustStatus::Rejected,
                reason: Some(err.code().to_string()),
            });
            tracing::info!(
                account = %self.meta.name,
                symbol,
                code = err.code(),
                %order_time,
                "order rejected"
            );
        }
        result
    }

    async fn place_locked(
        &self,
        st: &mut AccountState,
        symbol: &str,
        side: EntrustSide,
        price_micros: Option<i64>,
        qty_micros: i64,
        order_time: NaiveDateTime,
    ) -> Result<OrderResult, BrokerError> {
        let date = order_time.date();
        self.validate_session(st, order_time)?;
        validate_quantity(side, qty_micros)?;

        self.advance_to(st, date).await?;

        if self.policy.halt_on_suspended_holding {
            for sym in st.positions.keys() {
                if self.feed.close_price(sym, date).await?.is_none() {
                    return Err(BrokerError::Suspended {
                        symbol: sym.clone(),
                        date,
                    });
                }
            }
        }

        let order_side = match side.order_side() {
            Some(s) => s,
            // XDXR is never a client instruction.
            None => {
                return Err(BrokerError::LotSize {
                    shares_micros: qty_micros,
                })
            }
        };
        let factor = self.feed.adjust_factor(symbol, date).await?;

        // Resolve the actual share request.
        let mut shares_micros = qty_micros;
        if side == EntrustSide::SellPercent {
            let held = st
                .positions
                .get(symbol)
                .map(|p| p.current_shares_micros(factor))
                .unwrap_or(0);
            shares_micros = mul_micros(held, qty_micros);
        }

        // T+1 sellable clamp; sweep dust below one board lot.
        if order_side == OrderSide::Sell {
            let sellable = st
                .positions
                .get(symbol)
                .map(|p| p.sellable_micros(date, factor))
                .unwrap_or(0);
            if sellable == 0 {
                return Err(BrokerError::PositionShort {
                    symbol: symbol.to_string(),
                    date,
                });
            }
            if sellable - shares_micros < 100 * MICROS_SCALE {
                shares_micros = sellable;
            }
            shares_micros = shares_micros.min(sellable);
        }
        if shares_micros <= 0 {
            return Err(BrokerError::LotSize {
                shares_micros: qty_micros,
            });
        }

        let limits = self.feed.price_limits(symbol, date).await?;
        let bars = self.feed.match_bars(symbol, order_time).await?;

        let bid_kind = if price_micros.is_some() {
            BidKind::Limit
        } else {
            BidKind::Market
        };
        let fill = match_order(
            &MatchRequest {
                symbol: symbol.to_string(),
                side: order_side,
                bid_kind,
                limit_micros: price_micros,
                shares_micros,
                order_time,
            },
            &bars,
            &limits,
        )?;

        // Last fallible step: valuation inputs for the post-trade assets row.
        let mut marks = self.valuation_marks(st, date).await?;
        if !marks.contains_key(symbol) {
            let price = self.valuation_price(symbol, date).await?;
            marks.insert(symbol.to_string(), (price, factor));
        }

        // --- Commit (infallible except the cash check below) ---

        let money = mul_micros(fill.filled_micros, fill.avg_price_micros);
        let fee = mul_div(money, self.meta.commission_rate_micros, MICROS_SCALE);

        let eventual_profit = match order_side {
            OrderSide::Buy => {
                let required = money + fee;
                if required > st.cash_micros {
                    return Err(BrokerError::CashShortage {
                        required_micros: required,
                        available_micros: st.cash_micros,
                    });
                }
                st.cash_micros -= required;
                st.positions
                    .entry(symbol.to_string())
                    .or_insert_with(|| Position::new(symbol))
                    .apply_buy(fill.filled_micros, fill.avg_price_micros, date, factor);
                None
            }
            OrderSide::Sell => {
                let position = st
                    .positions
                    .get_mut(symbol)
                    .expect("sellable check guarantees a position");
                let sold =
                    position.apply_sell(fill.filled_micros, fill.avg_price_micros, date, factor);
                debug_assert_eq!(sold.consumed_micros, fill.filled_micros);
                if position.is_empty() {
                    st.positions.remove(symbol);
                }
                st.cash_micros += money - fee;
                Some(sold.gross_profit_micros - fee)
            }
        };

        let order_id = Uuid::new_v4();
        let status = if fill.is_partial(shares_micros) {
            EntrustStatus::Partial
        } else {
            EntrustStatus::Filled
        };
        let entrust = Entrust {
            order_id,
            symbol: symbol.to_string(),
            side,
            bid_kind,
            price_micros,
            shares_micros: qty_micros,
            order_time,
            status,
            reason: None,
        };
        let trade = Trade {
            trade_id: Uuid::new_v4(),
            order_id,
            symbol: symbol.to_string(),
            side,
            shares_micros: fill.filled_micros,
            price_micros: fill.avg_price_micros,
            fee_micros: fee,
            trade_time: fill.fill_time,
            eventual_profit_micros: eventual_profit,
        };

        st.entrusts.push(entrust.clone());
        st.trades.push(trade.clone());
        st.last_order_time = Some(order_time);

        // Re-mark the trade day now that the fill is in.
        let row = st.cash_micros + portfolio_value(&st.positions, &marks);
        st.assets.insert(date, row);

        tracing::info!(
            account = %self.meta.name,
            symbol,
            side = ?side,
            filled = fill.filled_micros,
            price = fill.avg_price_micros,
            ?status,
            "order filled"
        );
        Ok(OrderResult { entrust, trade })
    }

    fn validate_session(
        &self,
        st: &AccountState,
        order_time: NaiveDateTime,
    ) -> Result<(), BrokerError> {
        if st.stopped {
            return Err(BrokerError::AccountStopped { end: self.meta.end });
        }
        let date = order_time.date();
        if date < self.meta.start || date > self.meta.end {
            return Err(BrokerError::BadDatetime {
                detail: format!(
                    "order time {order_time} outside session {} .. {}",
                    self.meta.start, self.meta.end
                ),
            });
        }
        if let Some(last) = st.last_order_time {
            if order_time <= last {
                return Err(BrokerError::TimeRewind {
                    bid: order_time,
                    last,
                });
            }
        }
        // A rejected later-dated order may already have pulled the cursor
        // forward; never trade behind it.
        if date < st.xdxr_cursor {
            return Err(BrokerError::TimeRewind {
                bid: order_time,
                last: st.xdxr_cursor.and_hms_opt(0, 0, 0).expect("midnight"),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Corporate actions + daily assets walk
    // -----------------------------------------------------------------------

    /// Walk trading days in `(cursor, target]`: apply distributions on held
    /// symbols, then record that day's assets row.  Each day is staged with
    /// all feed IO first and applied atomically, so a feed failure never
    /// leaves a half-applied day behind.
    async fn advance_to(&self, st: &mut AccountState, target: NaiveDate) -> Result<(), BrokerError> {
        if target <= st.xdxr_cursor {
            return Ok(());
        }
        let cursor = st.xdxr_cursor;
        let days = self.feed.trading_days(cursor, target).await?;

        for d in days.into_iter().filter(move |d| *d > cursor) {
            // Stage: events and valuation inputs (all fallible IO).
            let mut events = Vec::new();
            for sym in st.positions.keys() {
                if let Some(ev) = self.feed.dividend(sym, d).await? {
                    if !ev.is_empty() {
                        let factor = self.feed.adjust_factor(sym, d).await?;
                        events.push((sym.clone(), ev, factor));
                    }
                }
            }
            let marks = self.valuation_marks(st, d).await?;

            // Apply: infallible from here.
            for (sym, ev, factor) in events {
                let position = st.positions.get_mut(&sym).expect("held symbol");
                if let Some(out) = xdxr::apply_event(position, &ev, factor, d) {
                    st.cash_micros += out.cash_delta_micros;
                    tracing::info!(
                        account = %self.meta.name,
                        symbol = %sym,
                        date = %d,
                        cash_delta = out.cash_delta_micros,
                        shares_delta = out.trade.shares_micros,
                        "corporate action applied"
                    );
                    st.trades.push(out.trade);
                }
            }
            let row = st.cash_micros + portfolio_value(&st.positions, &marks);
            st.assets.insert(d, row);
            st.xdxr_cursor = d;
        }
        Ok(())
    }

    /// Valuation inputs for every held symbol on `date`.
    async fn valuation_marks(
        &self,
        st: &AccountState,
        date: NaiveDate,
    ) -> Result<Marks, BrokerError> {
        let mut marks = Marks::new();
        for sym in st.positions.keys() {
            let price = self.valuation_price(sym, date).await?;
            let factor = self.feed.adjust_factor(sym, date).await?;
            marks.insert(sym.clone(), (price, factor));
        }
        Ok(marks)
    }

    /// The close on `date`, else the closest preceding close within the
    /// suspension lookback, else `None` (cost-basis fallback applies).
    async fn valuation_price(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<i64>, BrokerError> {
        if let Some(px) = self.feed.close_price(symbol, date).await? {
            return Ok(Some(px));
        }
        let lookback = self.policy.suspension_lookback_days as usize;
        // Civil window wide enough to contain `lookback` trading days.
        let window_start = date - Duration::days(lookback as i64 * 2 + 7);
        let days = self.feed.trading_days(window_start, date).await?;
        for d in days.iter().rev().filter(|d| **d < date).take(lookback) {
            if let Some(px) = self.feed.close_price(symbol, *d).await? {
                return Ok(Some(px));
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Read operations
    // -----------------------------------------------------------------------

    pub async fn info(&self, date: Option<NaiveDate>) -> Result<AccountInfo, BrokerError> {
        let st = self.state.lock().await;
        let date = date.unwrap_or_else(|| latest_date(&st, self.meta.start));
        let assets = assets_at(&st, self.meta.principal_micros, date);
        let positions = self.positions_at(&st, date).await?;
        let market_value: i64 = positions.iter().map(|p| p.market_value_micros).sum();
        let pnl = assets - self.meta.principal_micros;
        Ok(AccountInfo {
            name: self.meta.name.clone(),
            principal_micros: self.meta.principal_micros,
            start: self.meta.start,
            end: self.meta.end,
            stopped: st.stopped,
            last_trade: st.last_order_time,
            assets_micros: assets,
            available_micros: st.cash_micros,
            market_value_micros: market_value,
            pnl_micros: pnl,
            ppnl: pnl as f64 / self.meta.principal_micros.max(1) as f64,
            positions,
        })
    }

    pub async fn positions(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<Vec<PositionView>, BrokerError> {
        let st = self.state.lock().await;
        let date = date.unwrap_or_else(|| latest_date(&st, self.meta.start));
        self.positions_at(&st, date).await
    }

    /// Position views on `date`, reconstructed by replaying the trade log.
    async fn positions_at(
        &self,
        st: &AccountState,
        date: NaiveDate,
    ) -> Result<Vec<PositionView>, BrokerError> {
        let mut holdings: BTreeMap<String, Position> = BTreeMap::new();
        for trade in st.trades.iter().filter(|t| t.trade_time.date() <= date) {
            let day = trade.trade_time.date();
            let position = holdings
                .entry(trade.symbol.clone())
                .or_insert_with(|| Position::new(trade.symbol.clone()));
            match trade.side.order_side() {
                Some(OrderSide::Buy) => {
                    let factor = self.feed.adjust_factor(&trade.symbol, day).await?;
                    position.apply_buy(trade.shares_micros, trade.price_micros, day, factor);
                }
                Some(OrderSide::Sell) => {
                    let factor = self.feed.adjust_factor(&trade.symbol, day).await?;
                    position.apply_sell(trade.shares_micros, trade.price_micros, day, factor);
                }
                None => {
                    // XDXR: the stock component is a zero-cost lot.
                    if trade.shares_micros > 0 {
                        let factor = self.feed.adjust_factor(&trade.symbol, day).await?;
                        position.apply_buy(trade.shares_micros, 0, day, factor);
                    }
                }
            }
        }

        let mut views = Vec::new();
        for (sym, position) in holdings {
            if position.is_empty() {
                continue;
            }
            let factor = self.feed.adjust_factor(&sym, date).await?;
            let price = match self.valuation_price(&sym, date).await? {
                Some(px) => px,
                None => {
                    let shares = position.current_shares_micros(factor);
                    if shares > 0 {
                        mul_div(position.cost_value_micros(), MICROS_SCALE, shares)
                    } else {
                        0
                    }
                }
            };
            views.push(position.snapshot(date, price, factor));
        }
        Ok(views)
    }

    pub async fn bills(&self) -> BillsView {
        let st = self.state.lock().await;
        BillsView {
            entrusts: st.entrusts.clone(),
            trades: st.trades.clone(),
        }
    }

    pub async fn assets(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Vec<AssetsRow> {
        let st = self.state.lock().await;
        let start = start.unwrap_or(self.meta.start);
        let end = end.unwrap_or(self.meta.end);
        st.assets
            .range(start..=end)
            .map(|(date, assets_micros)| AssetsRow {
                date: *date,
                assets_micros: *assets_micros,
            })
            .collect()
    }

    pub async fn metrics(
        &self,
        benchmark: Option<&str>,
    ) -> Result<MetricsReport, BrokerError> {
        let st = self.state.lock().await;

        let series: Vec<i64> = st.assets.values().copied().collect();
        let total_sells = st
            .trades
            .iter()
            .filter(|t| t.eventual_profit_micros.is_some())
            .count() as u32;
        let winning_sells = st
            .trades
            .iter()
            .filter(|t| t.eventual_profit_micros.map(|p| p > 0).unwrap_or(false))
            .count() as u32;

        let metrics = StrategyMetrics::from_assets(
            &series,
            self.meta.principal_micros,
            self.policy.rf_annual,
            self.policy.annual_days,
            winning_sells,
            total_sells,
        );

        let baseline = match benchmark {
            Some(symbol) => self.baseline_metrics(symbol).await?,
            None => None,
        };

        Ok(MetricsReport {
            start: self.meta.start,
            end: self.meta.end,
            window: series.len() as u32,
            metrics,
            baseline,
        })
    }

    /// Same statistics over the benchmark's factor-adjusted daily closes.
    async fn baseline_metrics(
        &self,
        symbol: &str,
    ) -> Result<Option<StrategyMetrics>, BrokerError> {
        let start = self
            .meta
            .start
            .and_hms_opt(0, 0, 0)
            .expect("midnight");
        let end = self.meta.end.and_hms_opt(23, 59, 0).expect("end of day");
        let bars = self.feed.bars(symbol, start, end, Frame::Day).await?;
        if bars.len() < 2 {
            return Ok(None);
        }
        let values: Vec<f64> = bars
            .iter()
            .map(|b| {
                (b.close_micros as f64 / MICROS_SCALE as f64)
                    * (b.factor_micros as f64 / MICROS_SCALE as f64)
            })
            .collect();
        Ok(Some(StrategyMetrics::from_values(
            &values,
            self.policy.rf_annual,
            self.policy.annual_days,
        )))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Finalize the session: run the daily walk through `end_date` and
    /// freeze the account.  Idempotent.
    pub async fn stop(&self) -> Result<(), BrokerError> {
        let mut st = self.state.lock().await;
        if st.stopped {
            return Ok(());
        }
        self.advance_to(&mut st, self.meta.end).await?;
        st.stopped = true;
        tracing::info!(account = %self.meta.name, "backtest stopped");
        Ok(())
    }

    /// Serialize the full account state.
    pub async fn snapshot(&self, description: &str) -> AccountSnapshot {
        let st = self.state.lock().await;
        AccountSnapshot {
            name: self.meta.name.clone(),
            token: self.meta.token.clone(),
            principal_micros: self.meta.principal_micros,
            commission_rate_micros: self.meta.commission_rate_micros,
            start: self.meta.start,
            end: self.meta.end,
            description: description.to_string(),
            cash_micros: st.cash_micros,
            positions: st.positions.values().cloned().collect(),
            entrusts: st.entrusts.clone(),
            trades: st.trades.clone(),
            assets: st
                .assets
                .iter()
                .map(|(date, assets_micros)| AssetsRow {
                    date: *date,
                    assets_micros: *assets_micros,
                })
                .collect(),
            last_order_time: st.last_order_time,
            xdxr_cursor: st.xdxr_cursor,
            stopped: st.stopped,
        }
    }

    /// Rebuild an account from a persisted snapshot.
    pub fn from_snapshot(
        snap: AccountSnapshot,
        feed: Arc<dyn Feed>,
        policy: TradePolicy,
    ) -> Self {
        let meta = AccountMeta {
            name: snap.name,
            token: snap.token,
            principal_micros: snap.principal_micros,
            commission_rate_micros: snap.commission_rate_micros,
            start: snap.start,
            end: snap.end,
        };
        let state = AccountState {
            cash_micros: snap.cash_micros,
            positions: snap
                .positions
                .into_iter()
                .map(|p| (p.symbol.clone(), p))
                .collect(),
            entrusts: snap.entrusts,
            trades: snap.trades,
            assets: snap
                .assets
                .into_iter()
                .map(|row| (row.date, row.assets_micros))
                .collect(),
            last_order_time: snap.last_order_time,
            xdxr_cursor: snap.xdxr_cursor,
            stopped: snap.stopped,
        };
        Self {
            meta,
            policy,
            feed,
            state: Mutex::new(state),
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn validate_quantity(side: EntrustSide, qty_micros: i64) -> Result<(), BrokerError> {
    match side {
        EntrustSide::Buy | EntrustSide::MarketBuy => {
            if qty_micros <= 0 || round_lot_down(qty_micros) != qty_micros {
                return Err(BrokerError::LotSize {
                    shares_micros: qty_micros,
                });
            }
        }
        EntrustSide::SellPercent => {
            if qty_micros <= 0 || qty_micros > MICROS_SCALE {
                return Err(BrokerError::LotSize {
                    shares_micros: qty_micros,
                });
            }
        }
        EntrustSide::Sell | EntrustSide::MarketSell => {
            if qty_micros <= 0 {
                return Err(BrokerError::LotSize {
                    shares_micros: qty_micros,
                });
            }
        }
        EntrustSide::Xdxr => {}
    }
    Ok(())
}

/// Mark-to-market value of all positions with prefetched marks.
fn portfolio_value(positions: &BTreeMap<String, Position>, marks: &Marks) -> i64 {
    positions
        .iter()
        .map(|(sym, position)| match marks.get(sym) {
            Some((Some(price), factor)) => position.market_value_micros(*price, *factor),
            // Suspended beyond the lookback: value at what was paid.
            _ => position.cost_value_micros(),
        })
        .sum()
}

/// Latest row of the assets table on or before `date`, else the principal.
fn assets_at(st: &AccountState, principal_micros: i64, date: NaiveDate) -> i64 {
    st.assets
        .range(..=date)
        .next_back()
        .map(|(_, v)| *v)
        .unwrap_or(principal_micros)
}

fn latest_date(st: &AccountState, start: NaiveDate) -> NaiveDate {
    st.assets.keys().next_back().copied().unwrap_or(start)
}
