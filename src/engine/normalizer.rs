//! Market snapshot normalizer.
//!
//! Turns loosely-typed listing records into `MarketSnapshot`s. Every record
//! either becomes a snapshot or an explicit `SkipReason`; a bad record never
//! aborts the run.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::platforms::{OrderBookQuotes, RawMarket};
use crate::types::{EndgameError, MarketSnapshot, Outcome, OutcomeToken};

/// Listing prices of a binary market must sum to 1 within this margin.
const LISTING_SUM_TOLERANCE: Decimal = dec!(0.02);

/// Order-book midpoints are noisier; wider margin before they are ignored.
const QUOTE_SUM_TOLERANCE: Decimal = dec!(0.10);

// ---------------------------------------------------------------------------
// Skip reasons
// ---------------------------------------------------------------------------

/// Why a raw record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a valid JSON array: {detail}")]
    InvalidArray { field: &'static str, detail: String },

    #[error("field `{field}` is not numeric: {value}")]
    NonNumeric { field: &'static str, value: String },

    #[error("field `{field}` has {count} outcomes, expected 2")]
    OutcomeCount { field: &'static str, count: usize },

    #[error("end date is not a valid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("probability {value} for {outcome} is outside [0, 1]")]
    ProbabilityOutOfRange { outcome: Outcome, value: Decimal },

    #[error("outcome probabilities sum to {0}, expected 1")]
    ProbabilitySum(Decimal),
}

/// A record the normalizer dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub market_id: String,
    pub reason: SkipReason,
}

/// Output of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub snapshots: Vec<MarketSnapshot>,
    pub skipped: Vec<SkippedRecord>,
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Plain decimal notation: optional sign, digits with at most one point,
/// optional exponent. `Decimal::from_str` on its own also accepts `_`.
fn is_plain_number(text: &str) -> bool {
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(at) => (&text[..at], Some(&text[at + 1..])),
        None => (text, None),
    };

    let unsigned = mantissa.strip_prefix(['+', '-']).unwrap_or(mantissa);
    let mut parts = unsigned.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next().unwrap_or("");
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !digits(int) || !digits(frac) || int.len() + frac.len() == 0 {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && digits(exp)
        }
    }
}

/// Parse a numeric string into a `Decimal`, rejecting anything that is not
/// plain decimal or scientific notation.
pub fn parse_number(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if !is_plain_number(text) {
        return None;
    }
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)).ok()
}

/// Parse a JSON number or numeric string into a `Decimal`.
pub fn parse_decimal(value: &Value) -> Result<Decimal, String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(other.to_string()),
    };
    parse_number(&text).ok_or(text)
}

/// Parse a JSON array, or a string holding an encoded JSON array, into its
/// elements rendered as strings.
pub fn parse_string_array(value: &Value) -> Result<Vec<String>, String> {
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s).map_err(|e| e.to_string())?,
        other => return Err(format!("unexpected value {other}")),
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("unexpected element {other}")),
        })
        .collect()
}

/// Booleans arrive as JSON booleans or as "true"/"false" strings.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse an ISO-8601 end date. Naive timestamps are taken as UTC and bare
/// dates as the last second of that day.
pub fn parse_end_date(s: &str) -> Result<DateTime<Utc>, SkipReason> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SkipReason::InvalidTimestamp(s.to_string()))
}

fn required_id(raw: &RawMarket) -> Result<String, SkipReason> {
    let id = match &raw.id {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        Err(SkipReason::MissingField("id"))
    } else {
        Ok(id)
    }
}

fn required_text(value: &Option<String>, field: &'static str) -> Result<String, SkipReason> {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(SkipReason::MissingField(field)),
    }
}

fn binary_array(value: &Option<Value>, field: &'static str) -> Result<[String; 2], SkipReason> {
    let value = match value {
        Some(Value::Null) | None => return Err(SkipReason::MissingField(field)),
        Some(v) => v,
    };
    let items = parse_string_array(value)
        .map_err(|detail| SkipReason::InvalidArray { field, detail })?;
    match <[String; 2]>::try_from(items) {
        Ok(pair) => Ok(pair),
        Err(items) => Err(SkipReason::OutcomeCount { field, count: items.len() }),
    }
}

/// Optional numeric field: absent, null or empty means zero, anything else
/// must parse.
fn optional_decimal(value: &Option<Value>, field: &'static str) -> Result<Decimal, SkipReason> {
    match value {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Decimal::ZERO),
        Some(v) => parse_decimal(v).map_err(|value| SkipReason::NonNumeric { field, value }),
    }
}

fn probability(text: &str, outcome: Outcome) -> Result<Decimal, SkipReason> {
    let value = parse_number(text).ok_or_else(|| SkipReason::NonNumeric {
        field: "outcomePrices",
        value: text.to_string(),
    })?;
    check_range(value, outcome)
}

fn check_range(value: Decimal, outcome: Outcome) -> Result<Decimal, SkipReason> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        Err(SkipReason::ProbabilityOutOfRange { outcome, value })
    } else {
        Ok(value)
    }
}

/// Both tokens quoted, in range, and roughly complementary.
fn quoted_probabilities(
    quotes: &OrderBookQuotes,
    yes_token: &str,
    no_token: &str,
) -> Option<(Decimal, Decimal)> {
    let yes = check_range(*quotes.get(yes_token)?, Outcome::Yes).ok()?;
    let no = check_range(*quotes.get(no_token)?, Outcome::No).ok()?;
    if (yes + no - Decimal::ONE).abs() > QUOTE_SUM_TOLERANCE {
        debug!(yes_token, yes = %yes, no = %no, "Ignoring inconsistent order-book quotes");
        return None;
    }
    Some((yes, no))
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a single record. Order-book quotes, when present for both
/// outcome tokens, take precedence over the listing prices.
pub fn normalize_one(raw: &RawMarket, quotes: &OrderBookQuotes) -> Result<MarketSnapshot, SkipReason> {
    let id = required_id(raw)?;
    let question = required_text(&raw.question, "question")?;
    let end_date = parse_end_date(&required_text(&raw.end_date, "endDate")?)?;

    let [yes_text, no_text] = binary_array(&raw.outcome_prices, "outcomePrices")?;
    let [yes_token, no_token] = binary_array(&raw.clob_token_ids, "clobTokenIds")?;
    if yes_token.trim().is_empty() || no_token.trim().is_empty() {
        return Err(SkipReason::MissingField("clobTokenIds"));
    }

    let (yes_probability, no_probability) = match quoted_probabilities(quotes, &yes_token, &no_token) {
        Some(pair) => pair,
        None => {
            let yes = probability(&yes_text, Outcome::Yes)?;
            let no = probability(&no_text, Outcome::No)?;
            let sum = yes + no;
            if (sum - Decimal::ONE).abs() > LISTING_SUM_TOLERANCE {
                return Err(SkipReason::ProbabilitySum(sum));
            }
            (yes, no)
        }
    };

    Ok(MarketSnapshot {
        id,
        question,
        end_date,
        yes_probability,
        no_probability,
        fee: optional_decimal(&raw.fee, "fee")?,
        maker_base_fee: optional_decimal(&raw.maker_base_fee, "makerBaseFee")?,
        volume: optional_decimal(&raw.volume, "volume")?,
        liquidity: optional_decimal(&raw.liquidity, "liquidity")?,
        tokens: vec![
            OutcomeToken { token_id: yes_token, outcome: Outcome::Yes },
            OutcomeToken { token_id: no_token, outcome: Outcome::No },
        ],
        closed: raw.closed.as_ref().and_then(parse_bool).unwrap_or(false),
        accepting_orders: raw.accepting_orders.as_ref().and_then(parse_bool).unwrap_or(true),
        start_date: raw.start_date.clone(),
        created_at: raw.created_at.clone(),
    })
}

/// Normalize a batch, logging and collecting every skipped record.
pub fn normalize(records: &[RawMarket], quotes: &OrderBookQuotes) -> Normalized {
    let mut out = Normalized::default();

    for raw in records {
        match normalize_one(raw, quotes) {
            Ok(snapshot) => out.snapshots.push(snapshot),
            Err(reason) => {
                let market_id = raw.display_id();
                let err = EndgameError::MalformedInput {
                    market_id: market_id.clone(),
                    reason: reason.to_string(),
                };
                warn!(error = %err, "Skipping malformed market");
                out.skipped.push(SkippedRecord { market_id, reason });
            }
        }
    }

    info!(
        received = records.len(),
        normalized = out.snapshots.len(),
        skipped = out.skipped.len(),
        "Normalization complete"
    );
    out
}

/// Outcome token ids of every listing whose token field parses, for
/// order-book lookups ahead of normalization.
pub fn token_ids(records: &[RawMarket]) -> Vec<String> {
    records
        .iter()
        .filter_map(|raw| binary_array(&raw.clob_token_ids, "clobTokenIds").ok())
        .flat_map(|pair| pair.into_iter())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
