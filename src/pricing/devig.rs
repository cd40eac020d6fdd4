//! Fair-price extraction (devigging).
//!
//! Turns a set of raw bookmaker decimal prices into no-vig prices via
//! four interchangeable methods. The iterative methods (power, shin)
//! use Newton-Raphson with a shared tolerance and iteration cap.
//!
//! All methods are computed on every call; the caller picks one via
//! `FairPrices::price` according to policy. Power is the default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::OutcomeSide;

/// Convergence tolerance for Newton-Raphson iterations.
const TOLERANCE: f64 = 1e-4;

/// Iteration cap for Newton-Raphson.
const MAX_ITERATIONS: usize = 100;

/// Devig method selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevigMethod {
    Multiplicative,
    Additive,
    #[default]
    Power,
    Shin,
}

impl std::fmt::Display for DevigMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevigMethod::Multiplicative => write!(f, "multiplicative"),
            DevigMethod::Additive => write!(f, "additive"),
            DevigMethod::Power => write!(f, "power"),
            DevigMethod::Shin => write!(f, "shin"),
        }
    }
}

/// No-vig decimal prices per outcome, one map per method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FairPrices {
    pub multiplicative: BTreeMap<OutcomeSide, f64>,
    pub additive: BTreeMap<OutcomeSide, f64>,
    pub power: BTreeMap<OutcomeSide, f64>,
    pub shin: BTreeMap<OutcomeSide, f64>,
}

impl FairPrices {
    /// Fair decimal price for one outcome under the given method.
    pub fn price(&self, method: DevigMethod, outcome: OutcomeSide) -> Option<f64> {
        self.by_method(method).get(&outcome).copied()
    }

    /// Fair win probability (1 / fair price) for one outcome.
    pub fn probability(&self, method: DevigMethod, outcome: OutcomeSide) -> Option<f64> {
        self.price(method, outcome).map(|p| 1.0 / p)
    }

    pub fn by_method(&self, method: DevigMethod) -> &BTreeMap<OutcomeSide, f64> {
        match method {
            DevigMethod::Multiplicative => &self.multiplicative,
            DevigMethod::Additive => &self.additive,
            DevigMethod::Power => &self.power,
            DevigMethod::Shin => &self.shin,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }
}

/// Compute no-vig prices for a 2- or 3-outcome price set.
///
/// Non-positive prices carry no probability mass and are omitted from
/// every output map. An empty (or all-invalid) input yields empty
/// outputs for all four methods, never an error.
pub fn devig(prices: &BTreeMap<OutcomeSide, f64>) -> FairPrices {
    let entries: Vec<(OutcomeSide, f64)> = prices
        .iter()
        .filter(|(_, price)| **price > 0.0)
        .map(|(outcome, price)| (*outcome, 1.0 / price))
        .collect();

    if entries.is_empty() {
        return FairPrices::default();
    }

    let probs: Vec<f64> = entries.iter().map(|(_, p)| *p).collect();

    // A single-runner "market" has no overround structure to solve for;
    // every method degenerates to plain normalization.
    let (mult, add, power, shin) = if probs.len() < 2 {
        let normalized = adjust_multiplicative(&probs);
        (normalized.clone(), normalized.clone(), normalized.clone(), normalized)
    } else {
        (
            adjust_multiplicative(&probs),
            adjust_additive(&probs),
            adjust_power(&probs),
            adjust_shin(&probs),
        )
    };

    let to_prices = |adjusted: Vec<f64>| -> BTreeMap<OutcomeSide, f64> {
        entries
            .iter()
            .zip(adjusted)
            .map(|((outcome, _), prob)| (*outcome, 1.0 / prob))
            .collect()
    };

    FairPrices {
        multiplicative: to_prices(mult),
        additive: to_prices(add),
        power: to_prices(power),
        shin: to_prices(shin),
    }
}

/// Normalize implied probabilities to sum to 1.
fn adjust_multiplicative(probs: &[f64]) -> Vec<f64> {
    let booksum: f64 = probs.iter().sum();
    probs.iter().map(|p| p / booksum).collect()
}

/// Subtract each outcome's equal share of the overround.
fn adjust_additive(probs: &[f64]) -> Vec<f64> {
    let n = probs.len() as f64;
    let overround: f64 = probs.iter().sum::<f64>() - 1.0;
    probs.iter().map(|p| p - overround / n).collect()
}

/// Find the exponent k such that sum(p_i^k) = 1 via Newton-Raphson,
/// then raise each probability to k.
fn adjust_power(probs: &[f64]) -> Vec<f64> {
    let mut k = 1.0_f64;
    for _ in 0..MAX_ITERATIONS {
        let overround: f64 = probs.iter().map(|p| p.powf(k)).sum::<f64>() - 1.0;
        if overround.abs() < TOLERANCE {
            break;
        }
        let denominator: f64 = probs.iter().map(|p| p.ln() * p.powf(k)).sum();
        k -= overround / denominator;
    }
    probs.iter().map(|p| p.powf(k)).collect()
}

/// Shin's method: closed form for two outcomes, Newton-Raphson on the
/// insider-trading proportion z for three or more.
fn adjust_shin(probs: &[f64]) -> Vec<f64> {
    let overround: f64 = probs.iter().sum();
    let n = probs.len();
    let a: Vec<f64> = probs.iter().map(|p| p * p / overround).collect();

    let z = if n == 2 {
        let diff = probs[0] - probs[1];
        let diff_squared = diff * diff;
        ((overround - 1.0) * (diff_squared - overround)) / (overround * (diff_squared - 1.0))
    } else {
        let b = 1.0 / (n as f64 - 2.0);
        let mut z = 0.0_f64;
        for _ in 0..MAX_ITERATIONS {
            let c: Vec<f64> = a
                .iter()
                .map(|ai| (z * z + 4.0 * (1.0 - z) * ai).sqrt())
                .collect();
            let cond = z - b * (c.iter().sum::<f64>() - 2.0);
            if cond.abs() < TOLERANCE {
                break;
            }
            let denominator: f64 = 1.0
                - b * a
                    .iter()
                    .zip(&c)
                    .map(|(ai, ci)| (z - 2.0 * ai) / ci)
                    .sum::<f64>();
            z -= cond / denominator;
        }
        z
    };

    a.iter()
        .map(|ai| ((z * z + 4.0 * (1.0 - z) * ai).sqrt() - z) / (2.0 * (1.0 - z)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
