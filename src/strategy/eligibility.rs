//! Eligibility filter.
//!
//! A hard conjunctive screen: a market qualifies only when every check
//! passes. Each check reports the measured value so the reason string is a
//! faithful audit trail for that market at that instant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::{FeeRule, FilterConfig};
use crate::types::{EligibilityResult, MarketSnapshot};

/// Render a fraction as a percentage without trailing zeros (0.955 → "95.5%").
fn pct(value: Decimal) -> String {
    format!("{}%", (value * dec!(100)).normalize())
}

/// Outcome of one screening check.
struct Check {
    passed: bool,
    detail: String,
}

impl Check {
    fn pass(detail: String) -> Self {
        Self { passed: true, detail }
    }

    fn fail(detail: String) -> Self {
        Self { passed: false, detail }
    }
}

fn check_open(market: &MarketSnapshot) -> Check {
    if market.closed {
        Check::fail("market closed".to_string())
    } else if !market.accepting_orders {
        Check::fail("market not accepting orders".to_string())
    } else {
        Check::pass("market open".to_string())
    }
}

fn check_time(hours_to_end: f64, max_hours: f64) -> Check {
    if hours_to_end <= 0.0 {
        Check::fail(format!("ended {:.1}h ago", -hours_to_end))
    } else if hours_to_end > max_hours {
        Check::fail(format!("ends in {hours_to_end:.1}h > {max_hours}h limit"))
    } else {
        Check::pass(format!("ends in {hours_to_end:.1}h"))
    }
}

fn check_probability(matched: Decimal, cfg: &FilterConfig) -> Check {
    if matched < cfg.min_probability {
        return Check::fail(format!(
            "probability {} < {}",
            pct(matched),
            pct(cfg.min_probability)
        ));
    }
    if let Some(cap) = cfg.max_probability {
        if matched > cap {
            return Check::fail(format!("probability {} > {} cap", pct(matched), pct(cap)));
        }
    }
    Check::pass(format!("probability {} ≥ {}", pct(matched), pct(cfg.min_probability)))
}

fn check_fees(market: &MarketSnapshot, cfg: &FilterConfig) -> Check {
    let fee_ok = market.fee <= cfg.max_fee;
    let maker_ok = market.maker_base_fee <= cfg.max_fee;
    let passed = match cfg.fee_rule {
        FeeRule::All => fee_ok && maker_ok,
        FeeRule::Any => fee_ok || maker_ok,
    };

    let measured = if market.maker_base_fee.is_zero() {
        format!("fee {}", pct(market.fee))
    } else {
        format!("fee {}, maker fee {}", pct(market.fee), pct(market.maker_base_fee))
    };

    if passed {
        Check::pass(measured)
    } else {
        Check::fail(format!("{measured} > {} cap", pct(cfg.max_fee)))
    }
}

fn check_volume(market: &MarketSnapshot, floor: Decimal) -> Check {
    if market.volume >= floor {
        Check::pass(format!("volume {} ≥ {}", market.volume.normalize(), floor.normalize()))
    } else {
        Check::fail(format!("volume {} < {}", market.volume.normalize(), floor.normalize()))
    }
}

/// Screen one market against the filter configuration at instant `now`.
///
/// Pure: the same snapshot, instant and configuration always produce the
/// same verdict and reason.
pub fn evaluate(market: &MarketSnapshot, now: DateTime<Utc>, cfg: &FilterConfig) -> EligibilityResult {
    let hours_to_end = market.hours_to_end(now);
    let outcome = market.favoured_outcome();
    let matched_probability = market.favoured_probability();

    let mut checks = Vec::with_capacity(5);
    checks.push(check_probability(matched_probability, cfg));
    checks.push(check_time(hours_to_end, cfg.max_hours_to_end));
    checks.push(check_fees(market, cfg));
    if cfg.volume_floor > Decimal::ZERO {
        checks.push(check_volume(market, cfg.volume_floor));
    }
    if cfg.require_open {
        checks.push(check_open(market));
    }

    let passed: Vec<&str> = checks.iter().filter(|c| c.passed).map(|c| c.detail.as_str()).collect();
    let failed: Vec<&str> = checks.iter().filter(|c| !c.passed).map(|c| c.detail.as_str()).collect();
    let eligible = failed.is_empty();

    let reason = if eligible {
        passed.join(", ")
    } else if passed.is_empty() {
        format!("rejected: {}", failed.join(", "))
    } else {
        format!("rejected: {}; passed: {}", failed.join(", "), passed.join(", "))
    };

    debug!(market_id = %market.id, eligible, reason = %reason, "Market evaluated");

    EligibilityResult {
        market: market.clone(),
        eligible,
        outcome,
        matched_probability,
        hours_to_end,
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
