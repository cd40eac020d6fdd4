//! Reference-feed seam.
//!
//! The `OddsFeed` trait is the contract for the reference odds source:
//! alert polling (driven by an external loop) and best-effort live
//! price refresh. A static in-memory implementation is provided for
//! tests and dry runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[cfg(test)]
use mockall::automock;

use crate::types::{Alert, LineType, MatchHalf, OutcomeSide};

/// Key identifying one priced reference market.
pub type MarketKey = (String, LineType, Option<String>, MatchHalf);

/// Abstraction over the reference odds feed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Alerts raised since the given cursor. Polled periodically by an
    /// external loop; each alert is handed to `BetEngine::notify` once.
    async fn fetch_alerts(&self, since: DateTime<Utc>) -> Result<Vec<Alert>>;

    /// Best-effort live price refresh for one reference market.
    /// `Ok(None)` means the feed has no fresher prices than the alert
    /// snapshot; callers fall back per-field, not all-or-nothing.
    async fn live_prices(
        &self,
        event_id: &str,
        line_type: LineType,
        points: Option<f64>,
        half: MatchHalf,
    ) -> Result<Option<BTreeMap<OutcomeSide, f64>>>;
}

/// In-memory feed with preloaded prices. Alerts are drained FIFO.
#[derive(Default)]
pub struct StaticFeed {
    alerts: Mutex<Vec<Alert>>,
    prices: Mutex<BTreeMap<MarketKey, BTreeMap<OutcomeSide, f64>>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }

    /// Preload live prices for a market. Points are keyed at 0.1
    /// granularity so float noise cannot split entries.
    pub fn set_prices(
        &self,
        event_id: &str,
        line_type: LineType,
        points: Option<f64>,
        half: MatchHalf,
        prices: BTreeMap<OutcomeSide, f64>,
    ) {
        let key = (event_id.to_string(), line_type, points_key(points), half);
        self.prices.lock().unwrap().insert(key, prices);
    }
}

fn points_key(points: Option<f64>) -> Option<String> {
    points.map(|p| format!("{p:.1}"))
}

#[async_trait]
impl OddsFeed for StaticFeed {
    async fn fetch_alerts(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        let mut alerts = self.alerts.lock().unwrap();
        let drained: Vec<Alert> = std::mem::take(&mut *alerts);
        Ok(drained.into_iter().filter(|a| a.starts > since).collect())
    }

    async fn live_prices(
        &self,
        event_id: &str,
        line_type: LineType,
        points: Option<f64>,
        half: MatchHalf,
    ) -> Result<Option<BTreeMap<OutcomeSide, f64>>> {
        let key = (event_id.to_string(), line_type, points_key(points), half);
        Ok(self.prices.lock().unwrap().get(&key).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
