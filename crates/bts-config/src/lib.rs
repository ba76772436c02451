//! bts-config
//!
//! Layered YAML configuration: files are merged in order (later files
//! deep-merge over earlier ones — objects merge recursively, arrays and
//! scalars are replaced), then the merged document deserializes into the
//! typed [`ServerConfig`].  Missing sections fall back to defaults so a
//! deployment only writes the keys it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub metrics: MetricsSection,
    pub feed: FeedSection,
    pub trade: TradeSection,
    pub persist: PersistSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            auth: AuthSection::default(),
            metrics: MetricsSection::default(),
            feed: FeedSection::default(),
            trade: TradeSection::default(),
            persist: PersistSection::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// TCP bind address.
    pub addr: String,
    /// URL prefix all routes hang under.
    pub prefix: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7080".to_string(),
            prefix: "/backtest/api/trade/v0.3".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Token authorizing cross-account operations.
    pub admin_token: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            admin_token: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Annual risk-free rate used by Sharpe/Sortino.
    pub risk_free_rate: f64,
    /// Trading days per year for annualization.
    pub annual_days: u32,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.03,
            annual_days: 252,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSection {
    /// Feed implementation: currently `"file"`.
    pub interface: String,
    /// Fixture directory for the file feed.
    pub data_dir: String,
    /// Deadline applied to every feed call.
    pub timeout_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            interface: "file".to_string(),
            data_dir: "data".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSection {
    /// How far back valuation may look for the last close of a suspended
    /// symbol before falling back to cost basis.
    pub suspension_lookback_days: u32,
    /// Strict policy: any suspended holding blocks all trading on the
    /// account (the pre-0.4.5 rule).  Off by default.
    pub halt_on_suspended_holding: bool,
}

impl Default for TradeSection {
    fn default() -> Self {
        Self {
            suspension_lookback_days: 500,
            halt_on_suspended_holding: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistSection {
    /// Directory the snapshot store writes under.
    pub dir: String,
}

impl Default for PersistSection {
    fn default() -> Self {
        Self {
            dir: "state".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load + deep-merge YAML files in order, then deserialize.
pub fn load_layered_yaml(paths: &[&str]) -> Result<ServerConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    serde_json::from_value(merged).context("config does not match the expected schema")
}

/// String-input variant for tests (no filesystem).
pub fn load_layered_yaml_from_strings(yamls: &[&str]) -> Result<ServerConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in yamls.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml string #{i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    serde_json::from_value(merged).context("config does not match the expected schema")
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_input_yields_defaults() {
        let cfg = load_layered_yaml_from_strings(&["{}"]).unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.metrics.annual_days, 252);
        assert_eq!(cfg.trade.suspension_lookback_days, 500);
    }

    #[test]
    fn later_layer_overrides_earlier() {
        let base = "server:\n  addr: 0.0.0.0:7080\nmetrics:\n  risk_free_rate: 0.03\n";
        let env = "metrics:\n  risk_free_rate: 0.02\n";
        let cfg = load_layered_yaml_from_strings(&[base, env]).unwrap();
        assert_eq!(cfg.server.addr, "0.0.0.0:7080");
        assert!((cfg.metrics.risk_free_rate - 0.02).abs() < 1e-12);
        // Untouched sibling keys survive the merge.
        assert_eq!(cfg.metrics.annual_days, 252);
    }

    #[test]
    fn partial_section_keeps_sibling_defaults() {
        let cfg =
            load_layered_yaml_from_strings(&["trade:\n  halt_on_suspended_holding: true\n"])
                .unwrap();
        assert!(cfg.trade.halt_on_suspended_holding);
        assert_eq!(cfg.trade.suspension_lookback_days, 500);
    }

    #[test]
    fn file_loading_reports_missing_path() {
        let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
        assert!(err.to_string().contains("read config"));
    }

    #[test]
    fn file_loading_round_trip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "auth:\n  admin_token: secret-admin").unwrap();
        let path = f.path().to_string_lossy().into_owned();
        let cfg = load_layered_yaml(&[&path]).unwrap();
        assert_eq!(cfg.auth.admin_token, "secret-admin");
    }
}
