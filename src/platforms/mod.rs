//! Market data sources.
//!
//! Defines the `MarketSource` trait consumed by the run pipeline and the
//! raw record shape it yields. The only production implementation is the
//! Polymarket Gamma/CLOB client in `polymarket`.

pub mod polymarket;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order-book prices keyed by outcome token id.
pub type OrderBookQuotes = HashMap<String, Decimal>;

/// A market listing exactly as the source delivered it.
///
/// Numeric fields arrive either as JSON numbers or as numeric strings, and
/// the array fields are usually JSON documents encoded inside a string
/// (`"[\"0.96\",\"0.04\"]"`), so everything stays loosely typed until the
/// normalizer has inspected it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMarket {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<String>,
    #[serde(default, rename = "outcomePrices")]
    pub outcome_prices: Option<serde_json::Value>,
    #[serde(default, rename = "clobTokenIds")]
    pub clob_token_ids: Option<serde_json::Value>,
    #[serde(default)]
    pub volume: Option<serde_json::Value>,
    #[serde(default)]
    pub liquidity: Option<serde_json::Value>,
    #[serde(default)]
    pub fee: Option<serde_json::Value>,
    #[serde(default, rename = "makerBaseFee")]
    pub maker_base_fee: Option<serde_json::Value>,
    #[serde(default)]
    pub closed: Option<serde_json::Value>,
    #[serde(default, rename = "acceptingOrders")]
    pub accepting_orders: Option<serde_json::Value>,
    #[serde(default, rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

impl RawMarket {
    /// Best-effort identifier for log lines, even when the record is malformed.
    pub fn display_id(&self) -> String {
        match &self.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => "<unknown>".to_string(),
        }
    }
}

/// Resolution state of a single market, used by settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketResolution {
    pub market_id: String,
    pub closed: bool,
    /// Winning outcome label as reported by the source ("Yes", "No", ...).
    pub resolution: Option<String>,
}

/// Read-only access to a prediction-market venue.
///
/// The pipeline never retries or times out on its own; whatever the source
/// returns is treated as the complete snapshot for the run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch open markets ending within `max_hours` of `now`.
    async fn fetch_markets(&self, now: DateTime<Utc>, max_hours: f64) -> Result<Vec<RawMarket>>;

    /// Fetch order-book prices for the given outcome tokens. Tokens without
    /// a quote are simply absent from the map.
    async fn fetch_quotes(&self, token_ids: &[String]) -> Result<OrderBookQuotes>;

    /// Fetch the resolution state of one market.
    async fn fetch_resolution(&self, market_id: &str) -> Result<MarketResolution>;
}
