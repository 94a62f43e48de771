//! Dashboard API route handlers.
//!
//! All endpoints return JSON read straight from the run ledger. State is a
//! shared handle to the ledger backend.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::storage::RunLedger;
use crate::types::{EndgameError, RunRecord};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub type AppState = Arc<dyn RunLedger>;

/// `?date=YYYY-MM-DD` keeps only runs whose timestamp falls on that day.
#[derive(Debug, Default, Deserialize)]
pub struct RunFilter {
    pub date: Option<String>,
}

impl RunFilter {
    fn apply(&self, runs: Vec<RunRecord>) -> Vec<RunRecord> {
        match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(day) => runs
                .into_iter()
                .filter(|r| r.timestamp.to_rfc3339().starts_with(day))
                .collect(),
            None => runs,
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsResponse {
    pub total_runs: usize,
    pub total_trades: usize,
    pub failed_trades: usize,
    pub total_invested: Decimal,
    pub potential_payout: Decimal,
    pub potential_profit: Decimal,
    pub roi_pct: Decimal,
    /// Distinct run days, newest first.
    pub dates: Vec<String>,
}

impl StatsResponse {
    pub fn from_runs(runs: &[RunRecord]) -> Self {
        let mut stats = StatsResponse { total_runs: runs.len(), ..Default::default() };

        for run in runs {
            stats.total_trades += run.summary.trades_executed;
            stats.failed_trades += run.summary.trades_failed;
            stats.total_invested += run.summary.total_invested;
            stats.potential_payout += run.summary.potential_payout;
        }
        stats.potential_profit = stats.potential_payout - stats.total_invested;
        if stats.total_invested > Decimal::ZERO {
            stats.roi_pct = (stats.potential_profit / stats.total_invested * Decimal::ONE_HUNDRED).round_dp(2);
        }

        let mut dates: Vec<String> = runs.iter().map(|r| r.timestamp.format("%Y-%m-%d").to_string()).collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();
        stats.dates = dates;
        stats
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Ledger failures surface as 500 with a JSON body.
pub struct ApiError(EndgameError);

impl From<EndgameError> for ApiError {
    fn from(e: EndgameError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Dashboard ledger read failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/runs
pub async fn get_runs(
    State(ledger): State<AppState>,
    Query(filter): Query<RunFilter>,
) -> Result<Json<Vec<RunRecord>>, ApiError> {
    let runs = filter.apply(ledger.runs().await?);
    Ok(Json(runs))
}

/// GET /api/runs/latest
pub async fn get_latest_run(State(ledger): State<AppState>) -> Result<Response, ApiError> {
    let runs = ledger.runs().await?;
    Ok(match runs.into_iter().last() {
        Some(run) => Json(run).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

/// GET /api/stats
pub async fn get_stats(
    State(ledger): State<AppState>,
    Query(filter): Query<RunFilter>,
) -> Result<Json<StatsResponse>, ApiError> {
    let runs = filter.apply(ledger.runs().await?);
    Ok(Json(StatsResponse::from_runs(&runs)))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::sample_record;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(run_id: &str, day: u32) -> RunRecord {
        let mut r = sample_record(run_id);
        r.timestamp = Utc.with_ymd_and_hms(2026, 10, day, 9, 30, 0).unwrap();
        r
    }

    #[test]
    fn test_stats_aggregate_runs() {
        let stats = StatsResponse::from_runs(&[at("a", 16), at("b", 17)]);
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.failed_trades, 0);
        assert_eq!(stats.total_invested, dec!(2000));
        assert_eq!(stats.potential_payout, dec!(2083.32));
        assert_eq!(stats.potential_profit, dec!(83.32));
        assert_eq!(stats.roi_pct, dec!(4.17));
        assert_eq!(stats.dates, vec!["2026-10-17", "2026-10-16"]);
    }

    #[test]
    fn test_stats_empty() {
        let stats = StatsResponse::from_runs(&[]);
        assert_eq!(stats, StatsResponse::default());
    }

    #[test]
    fn test_date_filter() {
        let filter = RunFilter { date: Some("2026-10-16".into()) };
        let kept = filter.apply(vec![at("a", 16), at("b", 17), at("c", 16)]);
        let ids: Vec<_> = kept.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let all = RunFilter { date: Some(" ".into()) }.apply(vec![at("a", 16)]);
        assert_eq!(all.len(), 1);
    }
}
