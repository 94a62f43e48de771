//! Budget allocator.
//!
//! Ranks eligible markets and splits a fixed virtual budget evenly across
//! the best `max_selections` of them. Amounts are rounded to cents and the
//! total never exceeds the budget.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::cmp::Ordering;
use tracing::{info, warn};

use crate::types::{EligibilityResult, EndgameError, PlannedTrade};

/// A market that passed screening but could not be sized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSkip {
    pub market_id: String,
    pub reason: String,
}

/// Planned trades plus the markets dropped during sizing.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub trades: Vec<PlannedTrade>,
    pub skipped: Vec<AllocationSkip>,
}

impl Allocation {
    pub fn total(&self) -> Decimal {
        self.trades.iter().map(|t| t.amount).sum()
    }
}

/// Preference order: higher probability, then higher volume, then the
/// earlier end. Market id breaks any remaining tie so the order is total.
pub fn rank(a: &EligibilityResult, b: &EligibilityResult) -> Ordering {
    b.matched_probability
        .cmp(&a.matched_probability)
        .then_with(|| b.market.volume.cmp(&a.market.volume))
        .then_with(|| a.market.end_date.cmp(&b.market.end_date))
        .then_with(|| a.market.id.cmp(&b.market.id))
}

const CENT: Decimal = dec!(0.01);

/// Whole cents in `budget`, sub-cent remainder dropped.
fn whole_cents(budget: Decimal) -> Decimal {
    budget.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Split `budget` evenly into `count` cent amounts. Each share is rounded
/// down and the leftover cents go one at a time to the leading slots, so
/// shares differ by at most a cent and the sum never exceeds the budget.
pub fn split_budget(budget: Decimal, count: usize) -> Vec<Decimal> {
    if count == 0 {
        return Vec::new();
    }
    let cap = whole_cents(budget).max(Decimal::ZERO);
    let per = (cap / Decimal::from(count)).round_dp_with_strategy(2, RoundingStrategy::ToZero);

    let mut leftover = cap - per * Decimal::from(count);
    let mut amounts = vec![per; count];
    for amount in amounts.iter_mut() {
        if leftover < CENT {
            break;
        }
        *amount += CENT;
        leftover -= CENT;
    }
    amounts
}

/// Price usable for sizing: strictly between 0 and 1.
fn usable_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price < Decimal::ONE
}

/// Rank `eligible` and distribute `budget` across at most `max_selections`.
///
/// Markets priced at 0 or 1 are dropped with reason "invalid price" before
/// ranking. Selections beyond the number of whole cents in the budget are
/// dropped with reason "budget exhausted". An empty plan is a valid result.
pub fn allocate(
    eligible: &[EligibilityResult],
    budget: Decimal,
    max_selections: usize,
) -> Result<Allocation, EndgameError> {
    if budget.is_sign_negative() {
        return Err(EndgameError::Configuration(format!(
            "budget must not be negative, got {budget}"
        )));
    }

    let mut allocation = Allocation::default();
    let mut candidates: Vec<&EligibilityResult> = Vec::with_capacity(eligible.len());

    for result in eligible.iter().filter(|r| r.eligible) {
        if usable_price(result.matched_probability) {
            candidates.push(result);
        } else {
            let err = EndgameError::AllocationDegenerate {
                market_id: result.market.id.clone(),
                reason: format!("price {}", result.matched_probability),
            };
            warn!(error = %err, "Skipping market: invalid price");
            allocation.skipped.push(AllocationSkip {
                market_id: result.market.id.clone(),
                reason: "invalid price".to_string(),
            });
        }
    }

    if candidates.is_empty() {
        info!(skipped = allocation.skipped.len(), "Nothing to allocate");
        return Ok(allocation);
    }
    if max_selections == 0 {
        return Err(EndgameError::Configuration(format!(
            "max_selections is 0 but {} markets are eligible",
            candidates.len()
        )));
    }

    candidates.sort_by(|a, b| rank(a, b));
    candidates.truncate(max_selections);

    // Never select more markets than there are cents to hand out.
    let affordable = (whole_cents(budget) / CENT).to_usize().unwrap_or(usize::MAX);
    if candidates.len() > affordable {
        for result in candidates.drain(affordable..) {
            allocation.skipped.push(AllocationSkip {
                market_id: result.market.id.clone(),
                reason: "budget exhausted".to_string(),
            });
        }
    }
    if candidates.is_empty() {
        info!(skipped = allocation.skipped.len(), budget = %budget, "Budget too small to allocate");
        return Ok(allocation);
    }

    let amounts = split_budget(budget, candidates.len());
    allocation.trades = candidates
        .into_iter()
        .zip(amounts)
        .map(|(result, amount)| PlannedTrade {
            market_id: result.market.id.clone(),
            question: result.market.question.clone(),
            outcome: result.outcome,
            price: result.matched_probability,
            amount,
            reason: result.reason.clone(),
            end_date: result.market.end_date,
        })
        .collect();

    info!(
        selected = allocation.trades.len(),
        skipped = allocation.skipped.len(),
        total = format!("${:.2}", allocation.total()),
        "Allocation complete"
    );

    Ok(allocation)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
