//! Pipeline scenarios over both ledger backends.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use endgame::config::AppConfig;
use endgame::engine::settlement::{settle, SettlementStatus};
use endgame::engine::{plan_run, Pipeline};
use endgame::platforms::{OrderBookQuotes, RawMarket};
use endgame::storage::{JsonLedger, RunLedger, SqliteLedger};
use endgame::types::{EndgameError, ExecutionStatus, Outcome};

use crate::mock_source::{listing, MockSource};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 18, 0, 0).unwrap()
}

fn json_ledger(dir: &tempfile::TempDir) -> Arc<JsonLedger> {
    Arc::new(JsonLedger::new(dir.path().join("trades.json")))
}

#[tokio::test]
async fn test_single_eligible_market_gets_whole_budget() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = json_ledger(&dir);
    let source = MockSource::with_markets(vec![
        listing("soon", "0.96", 30, now()),
        listing("later", "0.96", 120, now()),
    ]);
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(source), ledger.clone());

    let record = pipeline.run_once("run-a", now()).await.unwrap();

    assert_eq!(record.planned_trades.len(), 1);
    let trade = &record.planned_trades[0];
    assert_eq!(trade.market_id, "soon");
    assert_eq!(trade.outcome, Outcome::Yes);
    assert_eq!(trade.price, dec!(0.96));
    assert_eq!(trade.amount, dec!(1000));
    assert!(trade.reason.contains("96%"), "{}", trade.reason);

    assert_eq!(record.executed_trades[0].status, ExecutionStatus::SimulatedFilled);
    assert_eq!(record.summary.markets_scanned, 2);
    assert_eq!(record.summary.markets_matching, 1);
    assert_eq!(record.summary.potential_payout, dec!(1041.67));

    let stored = ledger.runs().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].run_id, "run-a");
}

#[tokio::test]
async fn test_eight_eligible_markets_top_five_share_budget() {
    let markets: Vec<RawMarket> = (0..8)
        .map(|i| listing(&format!("m{i}"), &format!("0.9{}", 5 + i / 2), 10 + i as i64, now()))
        .collect();
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(MockSource::with_markets(markets)), ledger);

    let record = pipeline.run_once("eight", now()).await.unwrap();

    assert_eq!(record.summary.markets_matching, 8);
    assert_eq!(record.planned_trades.len(), 5);
    assert!(record.planned_trades.iter().all(|t| t.amount == dec!(200)));
    assert_eq!(record.summary.total_invested, dec!(1000));
    // 0.98 pair first, earlier end breaking the tie, then the 0.97 pair.
    let ids: Vec<_> = record.planned_trades.iter().map(|t| t.market_id.as_str()).collect();
    assert_eq!(ids, vec!["m6", "m7", "m4", "m5", "m2"]);
}

#[tokio::test]
async fn test_two_eligible_markets_split_evenly() {
    let source = MockSource::with_markets(vec![
        listing("a", "0.97", 20, now()),
        listing("b", "0.03", 40, now()),
    ]);
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(source), ledger);

    let record = pipeline.run_once("two", now()).await.unwrap();
    assert_eq!(record.planned_trades.len(), 2);
    assert!(record.planned_trades.iter().all(|t| t.amount == dec!(500)));
    let b = record.planned_trades.iter().find(|t| t.market_id == "b").unwrap();
    assert_eq!(b.outcome, Outcome::No);
    assert_eq!(b.price, dec!(0.97));
}

#[tokio::test]
async fn test_budget_smaller_than_selection_count_still_records() {
    let markets: Vec<RawMarket> = (0..5)
        .map(|i| listing(&format!("m{i}"), "0.96", 10 + i as i64, now()))
        .collect();
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(MockSource::with_markets(markets)), ledger.clone())
        .with_balance(dec!(0.03));

    let record = pipeline.run_once("pennies", now()).await.unwrap();

    assert_eq!(record.summary.markets_matching, 5);
    let ids: Vec<_> = record.planned_trades.iter().map(|t| t.market_id.as_str()).collect();
    assert_eq!(ids, vec!["m0", "m1", "m2"]);
    assert!(record.planned_trades.iter().all(|t| t.amount == dec!(0.01)));
    assert!(record.executed_trades.iter().all(|t| t.status == ExecutionStatus::SimulatedFilled));
    assert_eq!(record.summary.total_invested, dec!(0.03));
    assert_eq!(record.summary.balance_after, Decimal::ZERO);
    assert!(ledger.contains("pennies").await.unwrap());
}

#[tokio::test]
async fn test_nothing_eligible_records_empty_run() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = json_ledger(&dir);
    let source = MockSource::with_markets(vec![listing("coinflip", "0.55", 30, now())]);
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(source), ledger.clone());

    let record = pipeline.run_once("quiet", now()).await.unwrap();
    assert!(record.planned_trades.is_empty());
    assert!(record.executed_trades.is_empty());
    assert_eq!(record.summary.total_invested, Decimal::ZERO);
    assert_eq!(record.summary.balance_after, dec!(1000));
    assert!(ledger.contains("quiet").await.unwrap());
}

#[tokio::test]
async fn test_malformed_listings_skipped_not_fatal() {
    let mut broken_prices = listing("bad-prices", "0.96", 30, now());
    broken_prices.outcome_prices = Some(json!("[\"0.96\"]"));
    let mut broken_date = listing("bad-date", "0.96", 30, now());
    broken_date.end_date = Some("next tuesday".into());

    let source = MockSource::with_markets(vec![broken_prices, broken_date, listing("good", "0.99", 30, now())]);
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(source), ledger);

    let record = pipeline.run_once("mixed", now()).await.unwrap();
    assert_eq!(record.scan_info.markets_fetched, 3);
    assert_eq!(record.scan_info.markets_skipped, 2);
    assert_eq!(record.scan_info.markets_scanned, 1);
    assert_eq!(record.planned_trades.len(), 1);
    assert_eq!(record.planned_trades[0].market_id, "good");
}

#[tokio::test]
async fn test_duplicate_run_id_leaves_json_ledger_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = json_ledger(&dir);
    let source = MockSource::with_markets(vec![listing("a", "0.96", 30, now())]);
    let pipeline = Pipeline::new(AppConfig::default(), Arc::new(source), ledger.clone());

    pipeline.run_once("fixed-id", now()).await.unwrap();
    let before = std::fs::read_to_string(ledger.path()).unwrap();

    let err = pipeline.run_once("fixed-id", now()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<EndgameError>(), Some(EndgameError::LedgerConflict(_))));
    assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), before);
}

#[tokio::test]
async fn test_source_failure_aborts_without_record() {
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let source = Arc::new(MockSource::with_markets(vec![listing("a", "0.96", 30, now())]));
    source.set_error("gamma unavailable");
    let pipeline = Pipeline::new(AppConfig::default(), source.clone(), ledger.clone());

    assert!(pipeline.run_once("r", now()).await.is_err());
    assert_eq!(source.market_fetches.load(Ordering::SeqCst), 0);
    assert!(ledger.runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_config_never_fetches() {
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let source = Arc::new(MockSource::with_markets(vec![listing("a", "0.96", 30, now())]));
    let mut cfg = AppConfig::default();
    cfg.filter.min_probability = dec!(0.4);
    let pipeline = Pipeline::new(cfg, source.clone(), ledger.clone());

    let err = pipeline.run_once("r", now()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<EndgameError>(), Some(EndgameError::Configuration(_))));
    assert_eq!(source.market_fetches.load(Ordering::SeqCst), 0);
    assert!(ledger.runs().await.unwrap().is_empty());
}

#[test]
fn test_plan_run_idempotent_over_frozen_input() {
    let raw: Vec<RawMarket> = (0..6)
        .map(|i| listing(&format!("m{i}"), "0.97", 5 * (i as i64 + 1), now()))
        .collect();
    let cfg = AppConfig::default();

    let a = plan_run(&raw, &OrderBookQuotes::new(), now(), &cfg).unwrap();
    let b = plan_run(&raw, &OrderBookQuotes::new(), now(), &cfg).unwrap();
    assert_eq!(a.allocation.trades, b.allocation.trades);
    assert_eq!(a.stats, b.stats);
    assert!(a.allocation.total() <= cfg.allocation.virtual_budget);
}

#[tokio::test]
async fn test_settlement_report_over_recorded_runs() {
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let source = Arc::new(
        MockSource::with_markets(vec![listing("win", "0.96", 30, now()), listing("lose", "0.96", 30, now())])
            .resolve("win", Some("Yes"))
            .resolve("lose", Some("No")),
    );
    let pipeline = Pipeline::new(AppConfig::default(), source.clone(), ledger.clone());
    pipeline.run_once("r1", now()).await.unwrap();

    let runs = ledger.runs().await.unwrap();
    let report = settle(source.as_ref(), &runs).await;

    assert_eq!(report.won, 1);
    assert_eq!(report.lost, 1);
    let win = report.trades.iter().find(|t| t.market_id == "win").unwrap();
    assert_eq!(win.status, SettlementStatus::Won);
    // 500 / 0.96 = 520.83 payout on a 500 stake.
    assert_eq!(win.pnl, dec!(20.83));
    assert_eq!(report.realized_pnl, dec!(-479.17));
    // Settlement never writes.
    assert_eq!(ledger.runs().await.unwrap(), runs);
}
