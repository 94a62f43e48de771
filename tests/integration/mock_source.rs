//! Mock market source for integration testing.
//!
//! Serves a fixed set of listings and resolutions from memory and counts
//! how often it is asked, so tests can check what the pipeline fetched.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use endgame::platforms::{MarketResolution, MarketSource, OrderBookQuotes, RawMarket};

#[derive(Default)]
pub struct MockSource {
    markets: Vec<RawMarket>,
    resolutions: HashMap<String, MarketResolution>,
    force_error: Mutex<Option<String>>,
    pub market_fetches: AtomicUsize,
}

impl MockSource {
    pub fn with_markets(markets: Vec<RawMarket>) -> Self {
        Self { markets, ..Default::default() }
    }

    pub fn resolve(mut self, market_id: &str, winner: Option<&str>) -> Self {
        self.resolutions.insert(
            market_id.to_string(),
            MarketResolution {
                market_id: market_id.to_string(),
                closed: true,
                resolution: winner.map(String::from),
            },
        );
        self
    }

    /// Make every subsequent call fail with `msg`.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MarketSource for MockSource {
    async fn fetch_markets(&self, _now: DateTime<Utc>, _max_hours: f64) -> Result<Vec<RawMarket>> {
        self.check_error()?;
        self.market_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.markets.clone())
    }

    async fn fetch_quotes(&self, _token_ids: &[String]) -> Result<OrderBookQuotes> {
        self.check_error()?;
        Ok(OrderBookQuotes::new())
    }

    async fn fetch_resolution(&self, market_id: &str) -> Result<MarketResolution> {
        self.check_error()?;
        Ok(self.resolutions.get(market_id).cloned().unwrap_or(MarketResolution {
            market_id: market_id.to_string(),
            closed: false,
            resolution: None,
        }))
    }
}

/// A Gamma-shaped listing ending `minutes` after `now`.
pub fn listing(id: &str, yes: &str, minutes: i64, now: DateTime<Utc>) -> RawMarket {
    let yes_value: f64 = yes.parse().unwrap();
    let no = format!("{:.3}", 1.0 - yes_value);
    RawMarket {
        id: Some(json!(id)),
        question: Some(format!("Will event {id} happen?")),
        end_date: Some((now + Duration::minutes(minutes)).to_rfc3339()),
        outcome_prices: Some(json!(format!("[\"{yes}\", \"{no}\"]"))),
        clob_token_ids: Some(json!(format!("[\"{id}1\", \"{id}2\"]"))),
        volume: Some(json!("25000")),
        liquidity: Some(json!("4000")),
        fee: Some(json!("0")),
        maker_base_fee: Some(json!(0)),
        closed: Some(json!(false)),
        accepting_orders: Some(json!(true)),
        ..Default::default()
    }
}
