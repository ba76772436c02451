//! Axum router and all HTTP handlers.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! layers after the fact so tests can drive the bare router in process.
//! Business rejections answer HTTP 200 with a `failed` envelope; only a bad
//! token is an HTTP 401.  Partial fills are successes carrying the filled
//! shares and price.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use bts_broker::{Account, AccountMeta, AccountSnapshot};
use bts_schemas::{BrokerError, EntrustSide};

use crate::api_types::{
    parse_order_time, to_micros, ApiResponse, AssetsQuery, DeleteAccountsRequest, InfoQuery,
    LoadBacktestRequest, MetricsRequest, SaveBacktestRequest, SellPercentRequest,
    StartBacktestRequest, TradeRequest,
};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router under `prefix`.
pub fn build_router(state: Arc<AppState>, prefix: &str) -> Router {
    let api = Router::new()
        .route("/status", get(status))
        .route("/start_backtest", post(start_backtest))
        .route("/stop_backtest", post(stop_backtest))
        .route("/buy", post(buy))
        .route("/market_buy", post(market_buy))
        .route("/sell", post(sell))
        .route("/market_sell", post(market_sell))
        .route("/sell_percent", post(sell_percent))
        .route("/info", get(info))
        .route("/positions", get(positions))
        .route("/bills", get(bills))
        .route("/assets", get(assets))
        .route("/get_assets", get(assets))
        .route("/metrics", post(metrics))
        .route("/accounts", get(accounts))
        .route("/delete_accounts", post(delete_accounts))
        .route("/save_backtest", post(save_backtest))
        .route("/load_backtest", post(load_backtest))
        .with_state(state);

    if prefix.is_empty() || prefix == "/" {
        api
    } else {
        Router::new().nest(prefix, api)
    }
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

/// Token from the Authorization header (`Bearer x`, `Token x`, or bare).
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("Token "))
        .unwrap_or(raw)
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn account_for(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<Account>, BrokerError> {
    let token = bearer_token(headers).ok_or(BrokerError::Unauthorized)?;
    state.registry.get(&token).ok_or(BrokerError::Unauthorized)
}

/// Standard envelope mapping: 401 for bad tokens, 200 otherwise.
fn respond<T: Serialize>(result: Result<T, BrokerError>) -> Response {
    match result {
        Ok(data) => {
            let value = serde_json::to_value(data).unwrap_or(Value::Null);
            (StatusCode::OK, Json(ApiResponse::success(value))).into_response()
        }
        Err(err) => {
            let status = match err {
                BrokerError::Unauthorized => StatusCode::UNAUTHORIZED,
                _ => StatusCode::OK,
            };
            (status, Json(ApiResponse::failed(&err))).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

async fn status(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": st.service,
            "version": st.version,
        })),
    )
}

// ---------------------------------------------------------------------------
// POST /start_backtest
// ---------------------------------------------------------------------------

async fn start_backtest(
    State(st): State<Arc<AppState>>,
    Json(req): Json<StartBacktestRequest>,
) -> Response {
    let meta = AccountMeta {
        name: req.name,
        token: req.token,
        principal_micros: to_micros(req.principal),
        commission_rate_micros: to_micros(req.commission),
        start: req.start,
        end: req.end,
    };
    let result = st
        .registry
        .create(meta, Arc::clone(&st.feed), st.policy.clone())
        .map(|account| {
            let meta = account.meta();
            json!({
                "account_name": meta.name,
                "token": meta.token,
                "principal_micros": meta.principal_micros,
                "start": meta.start,
                "end": meta.end,
            })
        });
    respond(result)
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

async fn place_trade(
    st: Arc<AppState>,
    headers: HeaderMap,
    req: TradeRequest,
    side: EntrustSide,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        let order_time = parse_order_time(&req.order_time)?;
        let shares_micros = to_micros(req.volume);
        match (side, req.price) {
            // A priced buy/sell is a limit order; an unpriced one is market.
            (EntrustSide::Buy, Some(px)) => {
                account
                    .buy(&req.security, to_micros(px), shares_micros, order_time)
                    .await
            }
            (EntrustSide::Buy, None) | (EntrustSide::MarketBuy, _) => {
                account
                    .market_buy(&req.security, shares_micros, order_time)
                    .await
            }
            (EntrustSide::Sell, Some(px)) => {
                account
                    .sell(&req.security, to_micros(px), shares_micros, order_time)
                    .await
            }
            _ => {
                account
                    .market_sell(&req.security, shares_micros, order_time)
                    .await
            }
        }
    }
    .await;
    respond(result)
}

async fn buy(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Response {
    place_trade(st, headers, req, EntrustSide::Buy).await
}

async fn market_buy(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Response {
    place_trade(st, headers, req, EntrustSide::MarketBuy).await
}

async fn sell(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Response {
    place_trade(st, headers, req, EntrustSide::Sell).await
}

async fn market_sell(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Response {
    place_trade(st, headers, req, EntrustSide::MarketSell).await
}

async fn sell_percent(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SellPercentRequest>,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        let order_time = parse_order_time(&req.order_time)?;
        account
            .sell_percent(&req.security, to_micros(req.percent), order_time)
            .await
    }
    .await;
    respond(result)
}

// ---------------------------------------------------------------------------
// Read state
// ---------------------------------------------------------------------------

async fn info(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<InfoQuery>,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        account.info(q.date).await
    }
    .await;
    respond(result)
}

async fn positions(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<InfoQuery>,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        account.positions(q.date).await
    }
    .await;
    respond(result)
}

async fn bills(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        Ok(account.bills().await)
    }
    .await;
    respond(result)
}

async fn assets(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<AssetsQuery>,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        Ok(account.assets(q.start, q.end).await)
    }
    .await;
    respond(result)
}

async fn metrics(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MetricsRequest>,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        account.metrics(req.baseline.as_deref()).await
    }
    .await;
    respond(result)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

async fn stop_backtest(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        account.stop().await?;
        Ok(json!({ "stopped": true }))
    }
    .await;
    respond(result)
}

async fn accounts(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let result = (|| {
        let token = bearer_token(&headers).ok_or(BrokerError::Unauthorized)?;
        if !st.registry.is_admin(&token) {
            return Err(BrokerError::Unauthorized);
        }
        Ok(st.registry.list())
    })();
    respond(result)
}

async fn delete_accounts(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DeleteAccountsRequest>,
) -> Response {
    let result = (|| {
        let token = bearer_token(&headers).ok_or(BrokerError::Unauthorized)?;
        let remaining = st.registry.delete(&token, req.name.as_deref())?;
        Ok(json!({ "remaining": remaining }))
    })();
    respond(result)
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

async fn save_backtest(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SaveBacktestRequest>,
) -> Response {
    let result = async {
        let account = account_for(&st, &headers)?;
        let snap = account.snapshot(&req.description).await;
        let blob = serde_json::to_vec(&snap).map_err(|e| BrokerError::Persistence {
            detail: e.to_string(),
        })?;
        st.store.save(&req.name, &blob).await?;
        Ok(json!({ "name": req.name }))
    }
    .await;
    respond(result)
}

async fn load_backtest(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoadBacktestRequest>,
) -> Response {
    let result = async {
        let token = bearer_token(&headers).ok_or(BrokerError::Unauthorized)?;
        let blob = st
            .store
            .load(&req.name)
            .await?
            .ok_or_else(|| BrokerError::NotFound {
                name: req.name.clone(),
            })?;
        let snap: AccountSnapshot =
            serde_json::from_slice(&blob).map_err(|e| BrokerError::Persistence {
                detail: e.to_string(),
            })?;
        // Only the owning token (or the admin) may resurrect a session.
        if snap.token != token && !st.registry.is_admin(&token) {
            return Err(BrokerError::Unauthorized);
        }
        let account = Arc::new(Account::from_snapshot(
            snap,
            Arc::clone(&st.feed),
            st.policy.clone(),
        ));
        let brief = json!({
            "account_name": account.name(),
            "token": account.token(),
        });
        st.registry.insert_restored(account);
        Ok(brief)
    }
    .await;
    respond(result)
}
