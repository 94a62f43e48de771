//! Selection strategy: eligibility screening and budget allocation.

pub mod allocator;
pub mod eligibility;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::FilterConfig;
use crate::types::{EligibilityResult, MarketSnapshot};

/// Every snapshot's verdict for one run, split by outcome.
#[derive(Debug, Clone, Default)]
pub struct Screening {
    pub eligible: Vec<EligibilityResult>,
    pub rejected: Vec<EligibilityResult>,
}

/// Screen all snapshots at instant `now`. Input order is preserved within
/// each half.
pub fn screen(snapshots: &[MarketSnapshot], now: DateTime<Utc>, cfg: &FilterConfig) -> Screening {
    let (eligible, rejected): (Vec<_>, Vec<_>) = snapshots
        .iter()
        .map(|m| eligibility::evaluate(m, now, cfg))
        .partition(|r| r.eligible);

    for r in &eligible {
        info!(
            market_id = %r.market.id,
            outcome = %r.outcome,
            probability = %r.matched_probability,
            reason = %r.reason,
            "Market eligible"
        );
    }
    info!(
        screened = snapshots.len(),
        eligible = eligible.len(),
        rejected = rejected.len(),
        "Screening complete"
    );

    Screening { eligible, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_screen_partitions_in_order() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let snapshots = vec![
            MarketSnapshot::sample("a", dec!(0.96), 30, now),
            MarketSnapshot::sample("b", dec!(0.50), 30, now),
            MarketSnapshot::sample("c", dec!(0.01), 10, now),
        ];
        let s = screen(&snapshots, now, &FilterConfig::default());
        let ids: Vec<_> = s.eligible.iter().map(|r| r.market.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(s.rejected.len(), 1);
        assert_eq!(s.rejected[0].market.id, "b");
    }
}
