//! Polymarket integration.
//!
//! Uses the Gamma API for market discovery and resolution lookups and the
//! CLOB API for order-book midpoints. All endpoints used here are public;
//! no credentials are involved.
//!
//! Gamma API: https://gamma-api.polymarket.com
//! CLOB API: https://clob.polymarket.com

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::engine::normalizer::{parse_bool, parse_decimal, parse_string_array};
use crate::platforms::{MarketResolution, MarketSource, OrderBookQuotes, RawMarket};

/// Concurrent midpoint requests in flight.
const QUOTE_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    #[serde(default)]
    mid: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GammaMarketDetail {
    #[serde(default)]
    closed: Option<serde_json::Value>,
    #[serde(default)]
    resolution: Option<serde_json::Value>,
    #[serde(default, rename = "outcomePrices")]
    outcome_prices: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GammaClient {
    http: Client,
    gamma_url: String,
    clob_url: String,
    limit: u32,
    exclude_keywords: Vec<String>,
}

impl GammaClient {
    pub fn new(cfg: &ScanConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("endgame/0.1")
            .build()
            .context("Failed to build Polymarket HTTP client")?;

        Ok(Self {
            http,
            gamma_url: cfg.gamma_url.trim_end_matches('/').to_string(),
            clob_url: cfg.clob_url.trim_end_matches('/').to_string(),
            limit: cfg.limit,
            exclude_keywords: cfg.exclude_keywords.iter().map(|k| k.to_lowercase()).collect(),
        })
    }

    /// Drop listings whose question mentions an excluded keyword.
    pub fn exclude_keywords(&self, markets: Vec<RawMarket>) -> Vec<RawMarket> {
        markets
            .into_iter()
            .filter(|m| {
                let question = m.question.as_deref().unwrap_or("");
                match matched_keyword(question, &self.exclude_keywords) {
                    Some(kw) => {
                        debug!(market_id = %m.display_id(), keyword = kw, "Excluded by keyword");
                        false
                    }
                    None => true,
                }
            })
            .collect()
    }

    async fn fetch_midpoint(&self, token_id: &str) -> Result<Option<rust_decimal::Decimal>> {
        let url = format!("{}/midpoint", self.clob_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("CLOB midpoint request failed")?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let body: MidpointResponse = resp
            .json()
            .await
            .context("Failed to parse CLOB midpoint response")?;
        Ok(body.mid.as_ref().and_then(|v| parse_decimal(v).ok()))
    }
}

/// Returns the first keyword found as a whole word or phrase in `question`.
fn matched_keyword<'a>(question: &str, keywords: &'a [String]) -> Option<&'a str> {
    let words: Vec<String> = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect();
    let padded = format!(" {} ", words.join(" "));

    keywords
        .iter()
        .find(|kw| !kw.is_empty() && padded.contains(&format!(" {kw} ")))
        .map(|kw| kw.as_str())
}

/// Infer the winner from settled outcome prices (`["1","0"]` → "Yes").
fn resolution_from_prices(prices: &serde_json::Value) -> Option<String> {
    let parts = parse_string_array(prices).ok()?;
    if parts.len() != 2 {
        return None;
    }
    match (parts[0].trim(), parts[1].trim()) {
        ("1", "0") => Some("Yes".to_string()),
        ("0", "1") => Some("No".to_string()),
        _ => None,
    }
}

/// End of the listing window, `max_hours` after `now`.
fn horizon(now: DateTime<Utc>, max_hours: f64) -> Result<DateTime<Utc>> {
    Duration::try_milliseconds((max_hours * 3_600_000.0) as i64)
        .and_then(|window| now.checked_add_signed(window))
        .with_context(|| format!("max_hours {max_hours} is out of range"))
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// MarketSource implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketSource for GammaClient {
    async fn fetch_markets(&self, now: DateTime<Utc>, max_hours: f64) -> Result<Vec<RawMarket>> {
        let url = format!("{}/markets", self.gamma_url);
        let horizon = horizon(now, max_hours)?;
        debug!(%url, "Fetching Polymarket markets from Gamma API");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("closed", "false".to_string()),
                ("limit", self.limit.to_string()),
                ("end_date_min", iso(now)),
                ("end_date_max", iso(horizon)),
            ])
            .send()
            .await
            .context("Gamma API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error {status}: {body}");
        }

        let markets: Vec<RawMarket> = resp
            .json()
            .await
            .context("Failed to parse Gamma markets response")?;
        let total = markets.len();
        let kept = self.exclude_keywords(markets);

        info!(fetched = total, kept = kept.len(), "Fetched Gamma markets");
        Ok(kept)
    }

    async fn fetch_quotes(&self, token_ids: &[String]) -> Result<OrderBookQuotes> {
        let results: Vec<(String, Result<Option<rust_decimal::Decimal>>)> =
            stream::iter(token_ids.iter().cloned())
                .map(|token_id| async move {
                    let mid = self.fetch_midpoint(&token_id).await;
                    (token_id, mid)
                })
                .buffer_unordered(QUOTE_CONCURRENCY)
                .collect()
                .await;

        let mut quotes = OrderBookQuotes::new();
        for (token_id, result) in results {
            match result {
                Ok(Some(mid)) => {
                    quotes.insert(token_id, mid);
                }
                Ok(None) => debug!(%token_id, "No midpoint available"),
                Err(e) => warn!(%token_id, error = %e, "Midpoint lookup failed"),
            }
        }

        info!(requested = token_ids.len(), quoted = quotes.len(), "Fetched order-book quotes");
        Ok(quotes)
    }

    async fn fetch_resolution(&self, market_id: &str) -> Result<MarketResolution> {
        let url = format!("{}/markets/{}", self.gamma_url, urlencoding::encode(market_id));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Gamma market lookup failed for {market_id}"))?;

        if !resp.status().is_success() {
            anyhow::bail!("Gamma API error {} for market {market_id}", resp.status());
        }

        let detail: GammaMarketDetail = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Gamma market {market_id}"))?;

        let closed = detail.closed.as_ref().and_then(parse_bool).unwrap_or(false);
        let resolution = match &detail.resolution {
            Some(serde_json::Value::String(s)) if !s.is_empty() && s != "null" => Some(s.clone()),
            _ if closed => detail.outcome_prices.as_ref().and_then(resolution_from_prices),
            _ => None,
        };

        Ok(MarketResolution {
            market_id: market_id.to_string(),
            closed,
            resolution,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
