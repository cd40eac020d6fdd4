//! Fractional-Kelly stake sizing.
//!
//! Computes a recommended stake from the no-vig win probability and the
//! candidate account's bankroll, clamps it to odds-tiered bounds, and
//! rounds to denominations a human bettor would actually punch in.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Stake bounds for one odds range. Tiers are ordered; the first tier
/// containing the bookmaker odds wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsTier {
    pub name: String,
    pub min_odds: f64,
    pub max_odds: f64,
    pub min_stake: f64,
    pub max_stake: f64,
}

impl OddsTier {
    pub fn contains(&self, odds: f64) -> bool {
        odds >= self.min_odds && odds <= self.max_odds
    }
}

/// Stake sizing configuration.
#[derive(Debug, Clone)]
pub struct StakeConfig {
    /// Fractional Kelly multiplier (0.3 = bet 30% of full Kelly).
    pub kelly_fraction: f64,
    /// Global bounds, used when no odds tier matches.
    pub min_stake: f64,
    pub max_stake: f64,
    pub odds_tiers: Vec<OddsTier>,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: 0.3,
            min_stake: 10.0,
            max_stake: 1_000_000.0,
            odds_tiers: Vec::new(),
        }
    }
}

/// Sized stake recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedStake {
    /// Raw Kelly fraction before the multiplier.
    pub kelly_fraction: f64,
    /// Final stake after clamping and rounding.
    pub stake: f64,
    /// Name of the odds tier whose bounds applied, if any.
    pub tier: Option<String>,
}

pub struct StakeSizer {
    config: StakeConfig,
}

impl StakeSizer {
    pub fn new(config: StakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakeConfig {
        &self.config
    }

    /// Size a stake for one outcome.
    ///
    /// Kelly formula: f* = (b·p - q) / b, with b = odds - 1,
    /// p = fair win probability, q = 1 - p. A non-positive f* means the
    /// edge does not justify the odds: no bet.
    pub fn size(&self, odds: f64, win_prob: f64, bankroll: f64) -> Option<SizedStake> {
        if bankroll <= 0.0 || !(0.0..=1.0).contains(&win_prob) {
            return None;
        }

        let kelly = kelly_fraction(odds, win_prob);
        if kelly <= 0.0 {
            debug!(odds, win_prob, kelly, "Negative Kelly — no bet");
            return None;
        }

        let raw = bankroll * self.config.kelly_fraction * kelly;

        let tier = self.config.odds_tiers.iter().find(|t| t.contains(odds));
        let (lo, hi) = match tier {
            Some(t) => (t.min_stake, t.max_stake),
            None => (self.config.min_stake, self.config.max_stake),
        };

        let clamped = raw.clamp(lo, hi);
        let mut stake = round_to_denomination(clamped);
        // Nearest-rounding may dip below the floor; bump to the next
        // denomination at or above it.
        if stake < lo {
            let denom = denomination_for(lo);
            stake = (lo / denom).ceil() * denom;
        }

        debug!(
            odds,
            win_prob = format!("{:.4}", win_prob),
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            raw_stake = format!("{raw:.2}"),
            stake,
            tier = tier.map(|t| t.name.as_str()).unwrap_or("global"),
            "Stake sized"
        );

        Some(SizedStake {
            kelly_fraction: kelly,
            stake,
            tier: tier.map(|t| t.name.clone()),
        })
    }
}

/// Full Kelly fraction f* = (b·p - q) / b. Non-positive when the edge
/// does not justify the odds; independent of bankroll, so callers can
/// test the sign once per order rather than once per account.
pub fn kelly_fraction(odds: f64, win_prob: f64) -> f64 {
    let b = odds - 1.0;
    if b <= 0.0 {
        return -1.0;
    }
    let q = 1.0 - win_prob;
    (b * win_prob - q) / b
}

/// Rounding increment for a given stake magnitude.
fn denomination_for(stake: f64) -> f64 {
    match stake {
        s if s < 20.0 => 5.0,
        s if s < 100.0 => 10.0,
        s if s < 200.0 => 25.0,
        s if s < 1000.0 => 50.0,
        s if s < 5000.0 => 100.0,
        s if s < 10000.0 => 250.0,
        _ => 500.0,
    }
}

/// Round a stake to the nearest human-looking denomination.
fn round_to_denomination(stake: f64) -> f64 {
    let denom = denomination_for(stake);
    (stake / denom).round() * denom
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
