//! Paper trade executor.
//!
//! Turns planned trades into executed ones without touching a venue. A
//! trade fills unless its allocation fails validation, in which case it is
//! recorded as failed with the reason.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::types::{ExecutedTrade, ExecutionStatus, PlannedTrade};

/// Result of executing a batch of planned trades.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub executed: Vec<ExecutedTrade>,
    pub total_committed: Decimal,
}

impl ExecutionReport {
    pub fn filled(&self) -> usize {
        self.executed.iter().filter(|t| t.is_filled()).count()
    }

    pub fn failed(&self) -> usize {
        self.executed.len() - self.filled()
    }
}

/// Simulated executor working against a virtual balance.
pub struct PaperExecutor {
    balance: Decimal,
}

impl PaperExecutor {
    pub fn new(balance: Decimal) -> Self {
        Self { balance }
    }

    /// Remaining virtual balance.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    fn validate(&self, trade: &PlannedTrade) -> Result<(), String> {
        if trade.amount <= Decimal::ZERO {
            return Err(format!("non-positive amount {}", trade.amount));
        }
        if trade.price <= Decimal::ZERO || trade.price >= Decimal::ONE {
            return Err(format!("price {} outside (0, 1)", trade.price));
        }
        if trade.amount > self.balance {
            return Err(format!(
                "insufficient balance: need ${:.2}, have ${:.2}",
                trade.amount, self.balance
            ));
        }
        Ok(())
    }

    /// Execute every planned trade in order, stamping each with `now`.
    pub fn execute_batch(&mut self, trades: &[PlannedTrade], now: DateTime<Utc>) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for trade in trades {
            let (status, potential_payout, failure) = match self.validate(trade) {
                Ok(()) => {
                    self.balance -= trade.amount;
                    report.total_committed += trade.amount;
                    info!(
                        market_id = %trade.market_id,
                        outcome = %trade.outcome,
                        amount = format!("${:.2}", trade.amount),
                        price = %trade.price,
                        "[PAPER] Trade filled"
                    );
                    (ExecutionStatus::SimulatedFilled, trade.potential_payout(), None)
                }
                Err(reason) => {
                    warn!(market_id = %trade.market_id, reason = %reason, "[PAPER] Trade failed");
                    (ExecutionStatus::Failed, Decimal::ZERO, Some(reason))
                }
            };

            report.executed.push(ExecutedTrade {
                market_id: trade.market_id.clone(),
                question: trade.question.clone(),
                outcome: trade.outcome,
                price: trade.price,
                amount: trade.amount,
                reason: trade.reason.clone(),
                end_date: trade.end_date,
                status,
                timestamp: now,
                potential_payout,
                failure,
            });
        }

        info!(
            filled = report.filled(),
            failed = report.failed(),
            committed = format!("${:.2}", report.total_committed),
            balance = format!("${:.2}", self.balance),
            "Paper execution complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;
    use rust_decimal_macros::dec;

    fn planned(id: &str, price: Decimal, amount: Decimal) -> PlannedTrade {
        PlannedTrade {
            market_id: id.to_string(),
            question: format!("{id}?"),
            outcome: Outcome::Yes,
            price,
            amount,
            reason: "probability 96% ≥ 95%".into(),
            end_date: Utc::now(),
        }
    }

    #[test]
    fn test_all_valid_trades_fill() {
        let mut exec = PaperExecutor::new(dec!(1000));
        let now = Utc::now();
        let report = exec.execute_batch(
            &[planned("a", dec!(0.96), dec!(500)), planned("b", dec!(0.97), dec!(500))],
            now,
        );
        assert_eq!(report.filled(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.total_committed, dec!(1000));
        assert_eq!(exec.balance(), Decimal::ZERO);
        assert_eq!(report.executed[0].potential_payout, dec!(520.83));
        assert_eq!(report.executed[0].timestamp, now);
        assert_eq!(report.executed[0].status, ExecutionStatus::SimulatedFilled);
    }

    #[test]
    fn test_over_balance_trade_fails() {
        let mut exec = PaperExecutor::new(dec!(100));
        let report = exec.execute_batch(
            &[planned("a", dec!(0.96), dec!(80)), planned("b", dec!(0.96), dec!(80))],
            Utc::now(),
        );
        assert_eq!(report.filled(), 1);
        let failed = &report.executed[1];
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.potential_payout, Decimal::ZERO);
        assert!(failed.failure.as_deref().unwrap().contains("insufficient balance"));
        assert_eq!(exec.balance(), dec!(20));
    }

    #[test]
    fn test_invalid_allocation_fails() {
        let mut exec = PaperExecutor::new(dec!(100));
        let report = exec.execute_batch(
            &[planned("zero", dec!(0.96), dec!(0)), planned("certain", dec!(1), dec!(10))],
            Utc::now(),
        );
        assert_eq!(report.failed(), 2);
        assert_eq!(report.total_committed, Decimal::ZERO);
    }

    #[test]
    fn test_empty_batch() {
        let mut exec = PaperExecutor::new(dec!(100));
        let report = exec.execute_batch(&[], Utc::now());
        assert!(report.executed.is_empty());
        assert_eq!(exec.balance(), dec!(100));
    }
}
