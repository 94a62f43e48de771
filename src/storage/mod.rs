//! Run ledger.
//!
//! Builds immutable `RunRecord`s and appends them to an append-only store.
//! Two backends are provided: a JSON document guarded by a file lock, and a
//! SQLite table whose primary key enforces run-id uniqueness.

pub mod json;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::config::{LedgerBackend, LedgerConfig};
use crate::types::{EndgameError, ExecutedTrade, PlannedTrade, RunRecord, RunSummary, ScanStats};

pub use json::JsonLedger;
pub use sqlite::SqliteLedger;

/// Append-only store of run records.
///
/// `append` must reject a run id that is already present, and the
/// check-and-write must be atomic with respect to other appenders.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Durably append `record`. Fails with `LedgerConflict` on a duplicate id.
    async fn append(&self, record: &RunRecord) -> Result<(), EndgameError>;

    /// All records in append order.
    async fn runs(&self) -> Result<Vec<RunRecord>, EndgameError>;

    /// Whether a record with `run_id` exists.
    async fn contains(&self, run_id: &str) -> Result<bool, EndgameError> {
        Ok(self.runs().await?.iter().any(|r| r.run_id == run_id))
    }
}

/// Open the backend selected in configuration.
pub async fn open_ledger(cfg: &LedgerConfig) -> Result<Arc<dyn RunLedger>> {
    let ledger: Arc<dyn RunLedger> = match cfg.backend {
        LedgerBackend::Json => Arc::new(JsonLedger::new(&cfg.path)),
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::connect(&cfg.path).await?),
    };
    info!(backend = ?cfg.backend, path = %cfg.path, "Ledger opened");
    Ok(ledger)
}

/// Fresh globally-unique run identifier.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Assemble a run record, deriving every summary total from the trade
/// sequences themselves. Nothing is written here; a validation failure
/// leaves no trace in any ledger.
pub fn record_run(
    run_id: &str,
    timestamp: DateTime<Utc>,
    starting_balance: Decimal,
    planned_trades: Vec<PlannedTrade>,
    executed_trades: Vec<ExecutedTrade>,
    scan_info: ScanStats,
) -> Result<RunRecord, EndgameError> {
    let run_id = run_id.trim();
    if run_id.is_empty() {
        return Err(EndgameError::InvalidRecord("run id is empty".into()));
    }
    if starting_balance.is_sign_negative() {
        return Err(EndgameError::InvalidRecord(format!(
            "starting balance is negative: {starting_balance}"
        )));
    }
    if scan_info.markets_matching > scan_info.markets_scanned {
        return Err(EndgameError::InvalidRecord(format!(
            "{} matching markets out of {} scanned",
            scan_info.markets_matching, scan_info.markets_scanned
        )));
    }

    let planned_ids: HashSet<&str> = planned_trades.iter().map(|t| t.market_id.as_str()).collect();
    if executed_trades.len() > planned_trades.len() {
        return Err(EndgameError::InvalidRecord(format!(
            "{} executed trades for {} planned",
            executed_trades.len(),
            planned_trades.len()
        )));
    }
    if let Some(t) = executed_trades.iter().find(|t| !planned_ids.contains(t.market_id.as_str())) {
        return Err(EndgameError::InvalidRecord(format!(
            "executed trade for unplanned market {}",
            t.market_id
        )));
    }
    if let Some(t) = planned_trades.iter().find(|t| t.amount.is_sign_negative()) {
        return Err(EndgameError::InvalidRecord(format!(
            "negative amount {} for market {}",
            t.amount, t.market_id
        )));
    }

    let filled: Vec<&ExecutedTrade> = executed_trades.iter().filter(|t| t.is_filled()).collect();
    let total_invested: Decimal = filled.iter().map(|t| t.amount).sum();
    let potential_payout: Decimal = filled.iter().map(|t| t.potential_payout).sum();
    if total_invested > starting_balance {
        return Err(EndgameError::InvalidRecord(format!(
            "invested ${total_invested:.2} exceeds starting balance ${starting_balance:.2}"
        )));
    }

    let summary = RunSummary {
        markets_scanned: scan_info.markets_scanned,
        markets_matching: scan_info.markets_matching,
        markets_skipped: scan_info.markets_skipped,
        trades_planned: planned_trades.len(),
        trades_executed: filled.len(),
        trades_failed: executed_trades.len() - filled.len(),
        total_invested: total_invested.round_dp(2),
        potential_payout: potential_payout.round_dp(2),
        balance_after: (starting_balance - total_invested).round_dp(2),
    };

    Ok(RunRecord {
        run_id: run_id.to_string(),
        timestamp,
        starting_balance,
        planned_trades,
        executed_trades,
        scan_info,
        summary,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
