//! Run pipeline: fetch → normalize → screen → allocate → execute → record.
//!
//! `plan_run` is the pure decision step over a frozen snapshot; `Pipeline`
//! wraps it with the market source, the paper executor and the ledger.

pub mod executor;
pub mod normalizer;
pub mod settlement;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::platforms::{MarketSource, OrderBookQuotes, RawMarket};
use crate::storage::{self, RunLedger};
use crate::strategy::allocator::{self, Allocation};
use crate::strategy::{self, Screening};
use crate::types::{EndgameError, RunRecord, ScanStats};

use executor::PaperExecutor;
use normalizer::Normalized;

/// Every intermediate product of one planning pass.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub normalized: Normalized,
    pub screening: Screening,
    pub allocation: Allocation,
    pub stats: ScanStats,
}

/// Decide what to trade for a frozen snapshot at instant `now`.
///
/// Same input, same output: nothing here reads the clock, the network or
/// the ledger.
pub fn plan_run(
    raw: &[RawMarket],
    quotes: &OrderBookQuotes,
    now: DateTime<Utc>,
    cfg: &AppConfig,
) -> Result<RunPlan, EndgameError> {
    cfg.validate()?;

    let normalized = normalizer::normalize(raw, quotes);
    let screening = strategy::screen(&normalized.snapshots, now, &cfg.filter);
    let allocation = allocator::allocate(
        &screening.eligible,
        cfg.allocation.virtual_budget,
        cfg.allocation.max_selections,
    )?;

    let stats = ScanStats {
        markets_fetched: raw.len(),
        markets_scanned: normalized.snapshots.len(),
        markets_skipped: normalized.skipped.len(),
        markets_matching: screening.eligible.len(),
    };

    Ok(RunPlan { normalized, screening, allocation, stats })
}

/// One-shot run driver.
pub struct Pipeline {
    config: AppConfig,
    source: Arc<dyn MarketSource>,
    ledger: Arc<dyn RunLedger>,
    persist: bool,
}

impl Pipeline {
    pub fn new(config: AppConfig, source: Arc<dyn MarketSource>, ledger: Arc<dyn RunLedger>) -> Self {
        Self { config, source, ledger, persist: true }
    }

    /// Override the starting virtual balance (and with it the budget).
    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.config.allocation.virtual_budget = balance;
        self
    }

    /// Build the record but skip the ledger append.
    pub fn dry_run(mut self, dry: bool) -> Self {
        self.persist = !dry;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Execute a full run under `run_id` at instant `now`.
    ///
    /// Configuration problems abort before anything is fetched or written.
    /// Ledger failures (including a duplicate `run_id`) are returned as-is.
    pub async fn run_once(&self, run_id: &str, now: DateTime<Utc>) -> Result<RunRecord> {
        self.config.validate()?;
        let starting_balance = self.config.allocation.virtual_budget;
        info!(run_id, %now, balance = format!("${:.2}", starting_balance), "Starting run");

        let raw = self
            .source
            .fetch_markets(now, self.config.filter.max_hours_to_end)
            .await
            .context("Failed to fetch markets")?;

        let quotes = if self.config.scan.use_order_book {
            let tokens = normalizer::token_ids(&raw);
            match self.source.fetch_quotes(&tokens).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, "Order-book quotes unavailable; using listing prices");
                    OrderBookQuotes::new()
                }
            }
        } else {
            OrderBookQuotes::new()
        };

        let plan = plan_run(&raw, &quotes, now, &self.config)?;
        for skip in &plan.allocation.skipped {
            info!(market_id = %skip.market_id, reason = %skip.reason, "Eligible market not allocated");
        }

        let mut executor = PaperExecutor::new(starting_balance);
        let report = executor.execute_batch(&plan.allocation.trades, now);

        let record = storage::record_run(
            run_id,
            now,
            starting_balance,
            plan.allocation.trades,
            report.executed,
            plan.stats,
        )?;

        if self.persist {
            self.ledger.append(&record).await?;
        } else {
            info!(run_id = %record.run_id, "Dry run: ledger untouched");
        }

        info!(
            run_id = %record.run_id,
            scanned = record.summary.markets_scanned,
            matching = record.summary.markets_matching,
            executed = record.summary.trades_executed,
            invested = format!("${:.2}", record.summary.total_invested),
            payout = format!("${:.2}", record.summary.potential_payout),
            balance = format!("${:.2}", executor.balance()),
            "Run complete"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
