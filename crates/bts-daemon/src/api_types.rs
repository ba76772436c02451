//! Request and response types for the HTTP surface.
//!
//! Quantities arrive as plain decimal numbers (yuan, shares, fractions) and
//! are converted to micros at this boundary.  Response payloads carry the
//! domain structs verbatim — micros integers under `*_micros` keys — so no
//! precision is lost on the wire; client libraries convert for display.

use bts_schemas::{BrokerError, ErrorBody, MICROS_SCALE};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Every endpoint answers with this shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    /// `"success"` or `"failed"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: "success".to_string(),
            code: None,
            message: None,
            error: None,
            data: Some(data),
        }
    }

    pub fn failed(err: &BrokerError) -> Self {
        Self {
            status: "failed".to_string(),
            code: Some(err.code().to_string()),
            message: Some(err.to_string()),
            error: Some(err.to_body()),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct StartBacktestRequest {
    pub name: String,
    pub token: String,
    /// Initial cash, in currency units.
    pub principal: f64,
    /// Flat commission rate (e.g. 1e-4).
    pub commission: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TradeRequest {
    pub security: String,
    /// Limit price; absent for market orders.
    #[serde(default)]
    pub price: Option<f64>,
    /// Shares for buy/sell.
    pub volume: f64,
    /// ISO-8601 at minute resolution; the client drives time.
    pub order_time: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SellPercentRequest {
    pub security: String,
    /// Fraction of the holding in `(0, 1]`.
    pub percent: f64,
    pub order_time: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InfoQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AssetsQuery {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MetricsRequest {
    /// Benchmark symbol to compare against.
    #[serde(default)]
    pub baseline: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeleteAccountsRequest {
    /// Admin only: the account name to delete; all accounts when absent.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SaveBacktestRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoadBacktestRequest {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Decimal units → micros, rounding to the nearest micro.
pub fn to_micros(v: f64) -> i64 {
    (v * MICROS_SCALE as f64).round() as i64
}

/// Parse a client order time at minute resolution.
pub fn parse_order_time(raw: &str) -> Result<NaiveDateTime, BrokerError> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt);
        }
    }
    Err(BrokerError::BadDatetime {
        detail: format!("unparseable order_time: {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_micros_rounds() {
        assert_eq!(to_micros(10.0), 10_000_000);
        assert_eq!(to_micros(0.0001), 100);
        assert_eq!(to_micros(9.9286), 9_928_600);
    }

    #[test]
    fn order_time_accepts_iso_variants() {
        let want = NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(9, 40, 0)
            .unwrap();
        assert_eq!(parse_order_time("2022-03-01T09:40:00").unwrap(), want);
        assert_eq!(parse_order_time("2022-03-01T09:40").unwrap(), want);
        assert_eq!(parse_order_time("2022-03-01 09:40").unwrap(), want);
    }

    #[test]
    fn bad_order_time_is_bad_datetime() {
        let err = parse_order_time("yesterday-ish").unwrap_err();
        assert_eq!(err.code(), "BAD_DATETIME");
    }

    #[test]
    fn failed_envelope_carries_the_code() {
        let resp = ApiResponse::failed(&BrokerError::Unauthorized);
        assert_eq!(resp.status, "failed");
        assert_eq!(resp.code.as_deref(), Some("UNAUTHORIZED"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], "UNAUTHORIZED");
    }
}
