//! Shared types for the endgame scanner.
//!
//! These types form the data model used across all modules: normalized
//! market snapshots, eligibility verdicts, planned and executed trades,
//! and the run record persisted by the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// An outcome token paired with the label it pays out on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeToken {
    pub token_id: String,
    pub outcome: Outcome,
}

/// A normalized binary market, valid for the duration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub question: String,
    pub end_date: DateTime<Utc>,
    /// YES probability (0.0–1.0)
    pub yes_probability: Decimal,
    /// NO probability (0.0–1.0)
    pub no_probability: Decimal,
    pub fee: Decimal,
    pub maker_base_fee: Decimal,
    pub volume: Decimal,
    pub liquidity: Decimal,
    /// Exactly two entries, YES first.
    pub tokens: Vec<OutcomeToken>,
    pub closed: bool,
    pub accepting_orders: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (YES: {} | NO: {} | vol: ${} | ends {})",
            self.id,
            self.question,
            self.yes_probability,
            self.no_probability,
            self.volume.round_dp(0),
            self.end_date.to_rfc3339(),
        )
    }
}

impl MarketSnapshot {
    /// Hours from `now` until the market ends (negative once it has ended).
    pub fn hours_to_end(&self, now: DateTime<Utc>) -> f64 {
        (self.end_date - now).num_milliseconds() as f64 / 3_600_000.0
    }

    /// The side with the higher probability; YES wins ties.
    pub fn favoured_outcome(&self) -> Outcome {
        if self.yes_probability >= self.no_probability {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }

    /// Probability of the favoured side.
    pub fn favoured_probability(&self) -> Decimal {
        self.yes_probability.max(self.no_probability)
    }

    /// Helper to build a test snapshot ending `minutes` after `now`.
    #[cfg(test)]
    pub fn sample(id: &str, yes: Decimal, minutes: i64, now: DateTime<Utc>) -> Self {
        MarketSnapshot {
            id: id.to_string(),
            question: format!("Will {id} happen?"),
            end_date: now + chrono::Duration::minutes(minutes),
            yes_probability: yes,
            no_probability: Decimal::ONE - yes,
            fee: Decimal::ZERO,
            maker_base_fee: Decimal::ZERO,
            volume: Decimal::from(50_000),
            liquidity: Decimal::from(10_000),
            tokens: vec![
                OutcomeToken { token_id: format!("{id}-yes"), outcome: Outcome::Yes },
                OutcomeToken { token_id: format!("{id}-no"), outcome: Outcome::No },
            ],
            closed: false,
            accepting_orders: true,
            start_date: None,
            created_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Pass/fail verdict of the screening criteria for one market in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub market: MarketSnapshot,
    pub eligible: bool,
    /// Side that cleared (or came closest to) the probability threshold.
    pub outcome: Outcome,
    pub matched_probability: Decimal,
    pub hours_to_end: f64,
    /// Audit trail of the measured values behind the verdict.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

/// A budgeted trade chosen by the allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTrade {
    pub market_id: String,
    pub question: String,
    pub outcome: Outcome,
    /// Entry price (= matched probability).
    pub price: Decimal,
    /// Allocated virtual currency, 2 dp.
    pub amount: Decimal,
    pub reason: String,
    pub end_date: DateTime<Utc>,
}

impl fmt::Display for PlannedTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${} @ {} - {}",
            self.outcome, self.amount, self.price, self.question,
        )
    }
}

impl PlannedTrade {
    /// Outcome tokens bought with `amount`, each paying $1 if correct.
    pub fn potential_payout(&self) -> Decimal {
        if self.price.is_zero() {
            Decimal::ZERO
        } else {
            (self.amount / self.price).round_dp(2)
        }
    }
}

/// Result of (simulated) order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    SimulatedFilled,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::SimulatedFilled => write!(f, "simulated_filled"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A planned trade after the executor has processed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub market_id: String,
    pub question: String,
    pub outcome: Outcome,
    pub price: Decimal,
    pub amount: Decimal,
    pub reason: String,
    pub end_date: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
    /// `amount / price`, 2 dp. Zero for failed trades.
    pub potential_payout: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ExecutedTrade {
    pub fn is_filled(&self) -> bool {
        self.status == ExecutionStatus::SimulatedFilled
    }
}

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

/// Counters supplied by the scan stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Raw records received from the market source.
    pub markets_fetched: usize,
    /// Records normalized into snapshots.
    pub markets_scanned: usize,
    /// Records dropped by the normalizer.
    pub markets_skipped: usize,
    /// Snapshots that passed every eligibility check.
    pub markets_matching: usize,
}

/// Summary block of a run, derived from the trade sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub markets_scanned: usize,
    pub markets_matching: usize,
    pub markets_skipped: usize,
    pub trades_planned: usize,
    pub trades_executed: usize,
    pub trades_failed: usize,
    pub total_invested: Decimal,
    pub potential_payout: Decimal,
    pub balance_after: Decimal,
}

/// One immutable ledger entry per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub starting_balance: Decimal,
    pub planned_trades: Vec<PlannedTrade>,
    pub executed_trades: Vec<ExecutedTrade>,
    pub scan_info: ScanStats,
    pub summary: RunSummary,
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {}: scanned={} matching={} executed={} invested=${} payout=${} balance=${}",
            self.run_id,
            self.summary.markets_scanned,
            self.summary.markets_matching,
            self.summary.trades_executed,
            self.summary.total_invested,
            self.summary.potential_payout,
            self.summary.balance_after,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Run-level errors. Per-record problems never surface here; they are
/// recovered locally as skip reasons.
#[derive(Debug, thiserror::Error)]
pub enum EndgameError {
    #[error("Malformed market {market_id}: {reason}")]
    MalformedInput { market_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unusable price for market {market_id}: {reason}")]
    AllocationDegenerate { market_id: String, reason: String },

    #[error("Run id already recorded: {0}")]
    LedgerConflict(String),

    #[error("Invalid run record: {0}")]
    InvalidRecord(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
