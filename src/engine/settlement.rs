//! Settlement report.
//!
//! Looks up how the markets behind every simulated fill resolved and works
//! out realized P&L. Read-only: the ledger is never touched.

use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use crate::platforms::{MarketResolution, MarketSource};
use crate::types::{Outcome, RunRecord};

/// Resolution lookups in flight at once.
const SETTLEMENT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Won,
    Lost,
    Cancelled,
    Pending,
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementStatus::Won => "WON",
            SettlementStatus::Lost => "LOST",
            SettlementStatus::Cancelled => "CANCELLED",
            SettlementStatus::Pending => "PENDING",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettledTrade {
    pub run_id: String,
    pub market_id: String,
    pub question: String,
    pub outcome: Outcome,
    pub amount: Decimal,
    pub potential_payout: Decimal,
    pub status: SettlementStatus,
    /// Realized profit; zero while pending.
    pub pnl: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettlementReport {
    pub trades: Vec<SettledTrade>,
    pub won: usize,
    pub lost: usize,
    pub cancelled: usize,
    pub pending: usize,
    pub realized_pnl: Decimal,
    /// Stake still riding on unresolved markets.
    pub open_exposure: Decimal,
}

/// Map a market's resolution to the status of a position on `outcome`.
pub fn classify(resolution: &MarketResolution, outcome: Outcome) -> SettlementStatus {
    match resolution.resolution.as_deref().map(str::trim) {
        Some(label) if label.eq_ignore_ascii_case("cancelled") || label.eq_ignore_ascii_case("canceled") => {
            SettlementStatus::Cancelled
        }
        Some(label) if label.eq_ignore_ascii_case(&outcome.to_string()) => SettlementStatus::Won,
        Some(label) if label.eq_ignore_ascii_case(&outcome.opposite().to_string()) => SettlementStatus::Lost,
        Some(label) if !label.is_empty() => {
            debug!(market_id = %resolution.market_id, label, "Unrecognised resolution label");
            SettlementStatus::Pending
        }
        _ if resolution.closed => SettlementStatus::Cancelled,
        _ => SettlementStatus::Pending,
    }
}

fn realized(status: SettlementStatus, amount: Decimal, payout: Decimal) -> Decimal {
    match status {
        SettlementStatus::Won => (payout - amount).round_dp(2),
        SettlementStatus::Lost => -amount,
        SettlementStatus::Cancelled | SettlementStatus::Pending => Decimal::ZERO,
    }
}

/// Settle every simulated fill in `runs`. Each market is queried once; a
/// failed lookup leaves its trades pending.
pub async fn settle(source: &dyn MarketSource, runs: &[RunRecord]) -> SettlementReport {
    let market_ids: BTreeSet<String> = runs
        .iter()
        .flat_map(|r| r.executed_trades.iter())
        .filter(|t| t.is_filled())
        .map(|t| t.market_id.clone())
        .collect();

    let resolutions: HashMap<String, MarketResolution> = stream::iter(market_ids)
        .map(|market_id| async move {
            let result = source.fetch_resolution(&market_id).await;
            (market_id, result)
        })
        .buffer_unordered(SETTLEMENT_CONCURRENCY)
        .filter_map(|(market_id, result)| async move {
            match result {
                Ok(resolution) => Some((market_id, resolution)),
                Err(e) => {
                    warn!(market_id = %market_id, error = %e, "Resolution lookup failed");
                    None
                }
            }
        })
        .collect()
        .await;

    let mut report = SettlementReport::default();
    for run in runs {
        for trade in run.executed_trades.iter().filter(|t| t.is_filled()) {
            let status = resolutions
                .get(&trade.market_id)
                .map(|r| classify(r, trade.outcome))
                .unwrap_or(SettlementStatus::Pending);
            let pnl = realized(status, trade.amount, trade.potential_payout);

            match status {
                SettlementStatus::Won => report.won += 1,
                SettlementStatus::Lost => report.lost += 1,
                SettlementStatus::Cancelled => report.cancelled += 1,
                SettlementStatus::Pending => {
                    report.pending += 1;
                    report.open_exposure += trade.amount;
                }
            }
            report.realized_pnl += pnl;

            report.trades.push(SettledTrade {
                run_id: run.run_id.clone(),
                market_id: trade.market_id.clone(),
                question: trade.question.clone(),
                outcome: trade.outcome,
                amount: trade.amount,
                potential_payout: trade.potential_payout,
                status,
                pnl,
            });
        }
    }

    info!(
        won = report.won,
        lost = report.lost,
        cancelled = report.cancelled,
        pending = report.pending,
        pnl = format!("${:.2}", report.realized_pnl),
        "Settlement report built"
    );
    report
}
