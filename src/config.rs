//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (account passwords) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. The engine takes
//! the loaded document as a value object and never re-reads the file;
//! an external administrative surface owns rewrites.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::pricing::devig::DevigMethod;
use crate::pricing::stake::OddsTier;
use crate::types::{AccountProfile, EngineError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub bet_settings: BetSettings,
    #[serde(default)]
    pub accounts: Vec<AccountProfile>,
}

/// Dispatch and ingestion tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Global in-flight cap across all accounts.
    pub max_total_concurrent_bets: u32,
    /// Dispatch inline from `notify` instead of queueing.
    #[serde(default)]
    pub immediate_dispatch: bool,
    /// Requeue delay when the global cap is hit.
    #[serde(default = "default_global_cap_delay")]
    pub global_cap_delay_secs: u64,
    /// Requeue delay when no account is eligible.
    #[serde(default = "default_no_account_delay")]
    pub no_account_delay_secs: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Alerts whose match started at least this long ago are stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Enforce per-account minimum balances and debit stakes on success.
    #[serde(default = "default_track_balances")]
    pub track_balances: bool,
}

fn default_global_cap_delay() -> u64 {
    30
}

fn default_no_account_delay() -> u64 {
    60
}

fn default_dedup_capacity() -> usize {
    2000
}

fn default_stale_after() -> u64 {
    300
}

fn default_track_balances() -> bool {
    true
}

/// Staking and EV policy.
#[derive(Debug, Deserialize, Clone)]
pub struct BetSettings {
    /// Minimum expected value, in percent.
    pub min_ev: f64,
    /// Fractional Kelly multiplier (0.3 = bet 30% of full Kelly).
    pub kelly_fraction: f64,
    /// Global stake bounds, used when no odds tier matches.
    pub min_stake: f64,
    pub max_stake: f64,
    /// Ceiling on acceptable bookmaker odds.
    pub max_book_odds: f64,
    /// Assumed bankroll per account when balance tracking is off.
    pub bankroll: f64,
    /// Devig method whose fair price drives EV and sizing.
    #[serde(default)]
    pub devig_method: DevigMethod,
    /// Ordered odds ranges with independent stake bounds.
    #[serde(default)]
    pub odds_tiers: Vec<OddsTier>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an already-loaded TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Startup-fatal checks. A config that passes here cannot prevent
    /// the engine from running; everything else is per-alert and soft.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.accounts.is_empty() {
            return Err(EngineError::Config("no accounts configured".into()));
        }
        if !self.accounts.iter().any(|a| a.active) {
            return Err(EngineError::Config("no active accounts".into()));
        }
        if self.engine.max_total_concurrent_bets == 0 {
            return Err(EngineError::Config(
                "max_total_concurrent_bets must be positive".into(),
            ));
        }
        if self.bet_settings.kelly_fraction <= 0.0 || self.bet_settings.kelly_fraction > 1.0 {
            return Err(EngineError::Config(format!(
                "kelly_fraction must be in (0, 1], got {}",
                self.bet_settings.kelly_fraction
            )));
        }
        if self.bet_settings.min_stake > self.bet_settings.max_stake {
            return Err(EngineError::Config("min_stake exceeds max_stake".into()));
        }
        for tier in &self.bet_settings.odds_tiers {
            if tier.min_odds > tier.max_odds || tier.min_stake > tier.max_stake {
                return Err(EngineError::Config(format!(
                    "malformed odds tier '{}'",
                    tier.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [engine]
        max_total_concurrent_bets = 5
        immediate_dispatch = false

        [bet_settings]
        min_ev = 2.0
        kelly_fraction = 0.3
        min_stake = 10.0
        max_stake = 1000000.0
        max_book_odds = 3.0
        bankroll = 1000.0
        devig_method = "power"

        [[bet_settings.odds_tiers]]
        name = "low"
        min_odds = 1.01
        max_odds = 1.99
        min_stake = 6000.0
        max_stake = 12000.0

        [[bet_settings.odds_tiers]]
        name = "medium"
        min_odds = 2.0
        max_odds = 3.0
        min_stake = 3000.0
        max_stake = 7000.0

        [[accounts]]
        username = "acc1"
        password_env = "BETALERT_ACC1_PASSWORD"
        active = true
        max_concurrent_bets = 3
        min_balance = 100.0

        [[accounts]]
        username = "acc2"
        password_env = "BETALERT_ACC2_PASSWORD"
        proxy = "http://ng.proxy.example:42001"
        active = false
        max_concurrent_bets = 2
        min_balance = 50.0
    "#;

    #[test]
    fn test_parse_sample_config() {
        let cfg = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.engine.max_total_concurrent_bets, 5);
        assert_eq!(cfg.engine.global_cap_delay_secs, 30);
        assert_eq!(cfg.engine.no_account_delay_secs, 60);
        assert_eq!(cfg.engine.dedup_capacity, 2000);
        assert!(cfg.engine.track_balances);
        assert_eq!(cfg.bet_settings.devig_method, DevigMethod::Power);
        assert_eq!(cfg.bet_settings.odds_tiers.len(), 2);
        assert_eq!(cfg.accounts.len(), 2);
        assert_eq!(cfg.accounts[1].proxy.as_deref(), Some("http://ng.proxy.example:42001"));
    }

    #[test]
    fn test_no_accounts_is_fatal() {
        let stripped = SAMPLE.split("[[accounts]]").next().unwrap();
        let err = AppConfig::from_toml(stripped).unwrap_err();
        assert!(err.to_string().contains("no accounts"));
    }

    #[test]
    fn test_no_active_accounts_is_fatal() {
        let all_inactive = SAMPLE.replace("active = true", "active = false");
        let err = AppConfig::from_toml(&all_inactive).unwrap_err();
        assert!(err.to_string().contains("no active accounts"));
    }

    #[test]
    fn test_bad_kelly_fraction_is_fatal() {
        let bad = SAMPLE.replace("kelly_fraction = 0.3", "kelly_fraction = 0.0");
        assert!(AppConfig::from_toml(&bad).is_err());
    }

    #[test]
    fn test_malformed_tier_is_fatal() {
        let bad = SAMPLE.replace("min_odds = 2.0", "min_odds = 4.0");
        let err = AppConfig::from_toml(&bad).unwrap_err();
        assert!(err.to_string().contains("medium"));
    }

    #[test]
    fn test_tier_contains() {
        let cfg = AppConfig::from_toml(SAMPLE).unwrap();
        let low = &cfg.bet_settings.odds_tiers[0];
        assert!(low.contains(1.50));
        assert!(!low.contains(2.50));
    }
}
