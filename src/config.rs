//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field carries a default so that a missing file or section
//! still yields a runnable configuration.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::types::EndgameError;

/// Longest listing window a run may scan, one year.
pub const MAX_HOURS_TO_END: f64 = 8760.0;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub filter: FilterConfig,
    pub allocation: AllocationConfig,
    pub ledger: LedgerConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub gamma_url: String,
    pub clob_url: String,
    /// Page size requested from the listing endpoint.
    pub limit: u32,
    /// Questions containing any of these (case-insensitive) are dropped
    /// before normalization.
    pub exclude_keywords: Vec<String>,
    /// Fetch CLOB midpoints and prefer them over listing prices.
    pub use_order_book: bool,
    /// Seconds between runs in `watch` mode.
    pub interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".to_string(),
            clob_url: "https://clob.polymarket.com".to_string(),
            limit: 500,
            exclude_keywords: ["bitcoin", "btc", "ethereum", "eth", "solana", "xrp", "up or down"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            use_order_book: false,
            interval_secs: 3600,
        }
    }
}

/// How the two fee sources combine against `max_fee`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeeRule {
    /// Both `fee` and `maker_base_fee` must be within the cap.
    #[default]
    All,
    /// Either source within the cap is enough.
    Any,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub max_hours_to_end: f64,
    pub min_probability: Decimal,
    /// Optional upper cap on the matched probability.
    pub max_probability: Option<Decimal>,
    pub max_fee: Decimal,
    pub fee_rule: FeeRule,
    pub volume_floor: Decimal,
    /// Reject markets flagged closed or not accepting orders.
    pub require_open: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_hours_to_end: 1.0,
            min_probability: dec!(0.95),
            max_probability: None,
            max_fee: Decimal::ZERO,
            fee_rule: FeeRule::All,
            volume_floor: Decimal::ZERO,
            require_open: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AllocationConfig {
    pub max_selections: usize,
    pub virtual_budget: Decimal,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_selections: 5,
            virtual_budget: dec!(1000),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// File path for the JSON backend, database file for SQLite.
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Json,
            path: "data/trades.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject values that would make a run meaningless. Called before any
    /// market is fetched or ledger entry written.
    pub fn validate(&self) -> Result<(), EndgameError> {
        let f = &self.filter;
        if !(f.max_hours_to_end > 0.0 && f.max_hours_to_end <= MAX_HOURS_TO_END) {
            return Err(EndgameError::Configuration(format!(
                "max_hours_to_end must be in (0, {MAX_HOURS_TO_END}], got {}",
                f.max_hours_to_end
            )));
        }
        if f.min_probability <= dec!(0.5) || f.min_probability > Decimal::ONE {
            return Err(EndgameError::Configuration(format!(
                "min_probability must be in (0.5, 1], got {}",
                f.min_probability
            )));
        }
        if let Some(max) = f.max_probability {
            if max < f.min_probability || max > Decimal::ONE {
                return Err(EndgameError::Configuration(format!(
                    "max_probability must be in [min_probability, 1], got {max}"
                )));
            }
        }
        if f.max_fee.is_sign_negative() {
            return Err(EndgameError::Configuration(format!(
                "max_fee must not be negative, got {}",
                f.max_fee
            )));
        }
        if f.volume_floor.is_sign_negative() {
            return Err(EndgameError::Configuration(format!(
                "volume_floor must not be negative, got {}",
                f.volume_floor
            )));
        }
        if self.allocation.virtual_budget <= Decimal::ZERO {
            return Err(EndgameError::Configuration(format!(
                "virtual_budget must be positive, got {}",
                self.allocation.virtual_budget
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.filter.max_hours_to_end, 1.0);
        assert_eq!(cfg.filter.min_probability, dec!(0.95));
        assert_eq!(cfg.filter.max_fee, Decimal::ZERO);
        assert_eq!(cfg.filter.volume_floor, Decimal::ZERO);
        assert_eq!(cfg.filter.fee_rule, FeeRule::All);
        assert_eq!(cfg.allocation.max_selections, 5);
        assert_eq!(cfg.allocation.virtual_budget, dec!(1000));
        assert_eq!(cfg.ledger.backend, LedgerBackend::Json);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [filter]
            min_probability = 0.97
            fee_rule = "any"

            [ledger]
            backend = "sqlite"
            path = "data/ledger.db"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.filter.min_probability, dec!(0.97));
        assert_eq!(cfg.filter.fee_rule, FeeRule::Any);
        assert_eq!(cfg.filter.max_hours_to_end, 1.0);
        assert_eq!(cfg.allocation.max_selections, 5);
        assert_eq!(cfg.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(cfg.scan.limit, 500);
    }

    #[test]
    fn test_negative_budget_rejected() {
        let mut cfg = AppConfig::default();
        cfg.allocation.virtual_budget = dec!(-10);
        assert!(matches!(cfg.validate(), Err(EndgameError::Configuration(_))));
    }

    #[test]
    fn test_threshold_at_or_below_half_rejected() {
        let mut cfg = AppConfig::default();
        cfg.filter.min_probability = dec!(0.5);
        assert!(cfg.validate().is_err());
        cfg.filter.min_probability = dec!(1.01);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_max_probability_below_min_rejected() {
        let mut cfg = AppConfig::default();
        cfg.filter.max_probability = Some(dec!(0.90));
        assert!(cfg.validate().is_err());
        cfg.filter.max_probability = Some(dec!(0.98));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_non_positive_hours_rejected() {
        let mut cfg = AppConfig::default();
        cfg.filter.max_hours_to_end = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unbounded_hours_rejected() {
        let mut cfg = AppConfig::default();
        for hours in [1e12, f64::INFINITY, f64::NAN] {
            cfg.filter.max_hours_to_end = hours;
            assert!(matches!(cfg.validate(), Err(EndgameError::Configuration(_))), "{hours}");
        }
        cfg.filter.max_hours_to_end = MAX_HOURS_TO_END;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load_or_default("/nonexistent/endgame-config.toml").unwrap();
        assert_eq!(cfg.allocation.max_selections, 5);
        assert!(AppConfig::load("/nonexistent/endgame-config.toml").is_err());
    }

    #[test]
    fn test_shipped_config_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str(include_str!("../config.toml")).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(cfg.filter.min_probability, defaults.filter.min_probability);
        assert_eq!(cfg.allocation.virtual_budget, defaults.allocation.virtual_budget);
        assert_eq!(cfg.scan.exclude_keywords, defaults.scan.exclude_keywords);
        assert_eq!(cfg.ledger.path, defaults.ledger.path);
        assert!(cfg.validate().is_ok());
    }
}
