//! Bookmaker integration seam.
//!
//! Defines the `Bookmaker` trait (the contract the bet-execution
//! adapter for a concrete bookmaker must fulfil) plus the catalog
//! types the market resolver consumes. The adapter owns every
//! network/browser mechanic; the engine only ever sees these types.

pub mod paper;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::types::{AccountProfile, Session};

// ---------------------------------------------------------------------------
// Event catalog
// ---------------------------------------------------------------------------

/// Everything tradeable for one event on the bookmaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCatalog {
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "homeTeam")]
    pub home_team: String,
    #[serde(rename = "awayTeam")]
    pub away_team: String,
    pub markets: Vec<MarketGroup>,
}

/// One market group, e.g. "1x2" or "1st half - asian handicap".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketGroup {
    pub description: String,
    pub outcomes: Vec<OutcomeQuote>,
}

/// A single priced outcome inside a market group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeQuote {
    pub id: String,
    /// Display label, e.g. "Home (-0.5)" or "Over 2.5".
    pub description: String,
    /// Stated line, when the adapter extracted it.
    #[serde(default)]
    pub points: Option<f64>,
    pub odds: f64,
}

impl OutcomeQuote {
    /// The stated line, falling back to whatever number the display
    /// label carries ("Over 2.5", "Home (-0.5)").
    pub fn line_points(&self) -> Option<f64> {
        self.points.or_else(|| points_from_label(&self.description))
    }
}

/// Pull the last numeric token out of an outcome label.
pub fn points_from_label(label: &str) -> Option<f64> {
    label
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.trim_start_matches('+').parse::<f64>().ok())
        .last()
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// A fully specified bet submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BetRequest {
    pub event_id: String,
    pub outcome_id: String,
    pub odds: f64,
    pub stake: f64,
}

/// Proof of a placed bet.
#[derive(Debug, Clone)]
pub struct BetReceipt {
    pub bet_id: String,
    pub placed_at: DateTime<Utc>,
}

impl BetReceipt {
    /// Receipt for a paper (non-real-money) placement.
    pub fn paper() -> Self {
        Self {
            bet_id: format!("paper-{}", Uuid::new_v4()),
            placed_at: Utc::now(),
        }
    }
}

/// Execution failure classification. The dispatcher reacts differently
/// to auth failures (session renewal + one retry) than to the rest.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    #[error("session expired or unauthenticated")]
    SessionExpired,

    #[error("bet rejected by bookmaker: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ExecError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ExecError::SessionExpired)
    }
}

// ---------------------------------------------------------------------------
// Bookmaker trait
// ---------------------------------------------------------------------------

/// Abstraction over a target bookmaker's execution adapter.
///
/// Implementors own event search, catalog retrieval, bet submission,
/// and session management, including whatever browser automation or
/// HTTP plumbing that takes. The engine core never performs I/O itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Bookmaker: Send + Sync {
    /// Find the bookmaker's event id for a fixture. `None` when the
    /// bookmaker does not list the match.
    async fn search_event(
        &self,
        home: &str,
        away: &str,
        starts: Option<DateTime<Utc>>,
    ) -> Result<Option<String>>;

    /// Full market catalog for an event.
    async fn event_catalog(&self, event_id: &str) -> Result<EventCatalog>;

    /// Submit a bet on behalf of an account. The session is a snapshot
    /// of the account's pool state at assignment time.
    async fn execute_bet(
        &self,
        account: &AccountProfile,
        session: Option<Session>,
        request: &BetRequest,
    ) -> Result<BetReceipt, ExecError>;

    /// Re-authenticate an account, returning a fresh session (with a
    /// refreshed balance when the bookmaker exposes one at login).
    async fn renew_session(&self, account: &AccountProfile) -> Result<Session, ExecError>;

    /// Adapter name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_from_label() {
        assert_eq!(points_from_label("Over 2.5"), Some(2.5));
        assert_eq!(points_from_label("Under 0.5"), Some(0.5));
        assert_eq!(points_from_label("Home (-0.5)"), Some(-0.5));
        assert_eq!(points_from_label("Away (+0.25)"), Some(0.25));
        assert_eq!(points_from_label("Over 2.5 Goals"), Some(2.5));
        assert_eq!(points_from_label("Draw"), None);
        assert_eq!(points_from_label(""), None);
    }

    #[test]
    fn test_outcome_explicit_points_win_over_label() {
        let outcome = OutcomeQuote {
            id: "12".into(),
            description: "Over 2.5".into(),
            points: Some(3.5),
            odds: 1.9,
        };
        assert_eq!(outcome.line_points(), Some(3.5));
    }

    #[test]
    fn test_catalog_parses_adapter_json() {
        // Shape as delivered by the execution adapter's catalog endpoint.
        let json = r#"{
            "eventId": "sr:match:57490675",
            "homeTeam": "Fluminense",
            "awayTeam": "Al Hilal SFC",
            "markets": [
                {
                    "description": "over/under",
                    "outcomes": [
                        {"id": "12", "description": "Over 2.5", "odds": 1.85},
                        {"id": "13", "description": "Under 2.5", "odds": 1.95}
                    ]
                }
            ]
        }"#;
        let catalog: EventCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.event_id, "sr:match:57490675");
        assert_eq!(catalog.markets.len(), 1);
        let outcome = &catalog.markets[0].outcomes[0];
        assert_eq!(outcome.points, None);
        assert_eq!(outcome.line_points(), Some(2.5));
    }

    #[test]
    fn test_exec_error_classification() {
        assert!(ExecError::SessionExpired.is_auth_failure());
        assert!(!ExecError::Rejected("limits".into()).is_auth_failure());
        assert!(!ExecError::Transport("timeout".into()).is_auth_failure());
    }
}
