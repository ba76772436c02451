//! Shared runtime state for the daemon.
//!
//! Handlers receive `State<Arc<AppState>>`; everything here is wired once at
//! startup and immutable afterwards except the registry's account map.

use std::sync::Arc;

use bts_broker::{Registry, SnapshotStore, TradePolicy};
use bts_config::ServerConfig;
use bts_feed::Feed;

/// Cloneable (Arc) handle shared across all handlers.
pub struct AppState {
    pub registry: Registry,
    pub feed: Arc<dyn Feed>,
    pub store: Arc<dyn SnapshotStore>,
    pub policy: TradePolicy,
    pub service: &'static str,
    pub version: &'static str,
}

impl AppState {
    pub fn new(cfg: &ServerConfig, feed: Arc<dyn Feed>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            registry: Registry::new(cfg.auth.admin_token.clone()),
            feed,
            store,
            policy: TradePolicy {
                rf_annual: cfg.metrics.risk_free_rate,
                annual_days: cfg.metrics.annual_days,
                suspension_lookback_days: cfg.trade.suspension_lookback_days,
                halt_on_suspended_holding: cfg.trade.halt_on_suspended_holding,
            },
            service: "bts-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
