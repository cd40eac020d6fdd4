//! Paper bookmaker.
//!
//! A deterministic in-memory `Bookmaker` used by tests and dry-run
//! embeddings: known catalogs, sessions minted on demand, every
//! "placed" bet recorded instead of submitted. Failures are injectable
//! so dispatch retry paths can be exercised without a network.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use super::{BetReceipt, BetRequest, Bookmaker, EventCatalog, ExecError, MarketGroup, OutcomeQuote};
use crate::types::{AccountProfile, Session};

/// Record of one paper placement.
#[derive(Debug, Clone)]
pub struct PaperBet {
    pub username: String,
    pub request: BetRequest,
    pub receipt: BetReceipt,
}

pub struct PaperBook {
    catalogs: Vec<EventCatalog>,
    session_ttl: Duration,
    /// Balance reported on every login.
    login_balance: Option<f64>,
    bets: Mutex<Vec<PaperBet>>,
    /// Errors returned by upcoming `execute_bet` calls, oldest first.
    scripted_failures: Mutex<Vec<ExecError>>,
    renewals: Mutex<u32>,
}

impl PaperBook {
    pub fn new(catalogs: Vec<EventCatalog>) -> Self {
        Self {
            catalogs,
            session_ttl: Duration::hours(4),
            login_balance: None,
            bets: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(Vec::new()),
            renewals: Mutex::new(0),
        }
    }

    pub fn with_login_balance(mut self, balance: f64) -> Self {
        self.login_balance = Some(balance);
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Queue an error for the next `execute_bet` call. Multiple queued
    /// errors are consumed in order; once drained, execution succeeds.
    pub fn fail_next_execution(&self, error: ExecError) {
        self.scripted_failures.lock().unwrap().push(error);
    }

    /// All paper placements recorded so far.
    pub fn placed_bets(&self) -> Vec<PaperBet> {
        self.bets.lock().unwrap().clone()
    }

    pub fn renewal_count(&self) -> u32 {
        *self.renewals.lock().unwrap()
    }

    /// A demo soccer catalog with the full market spread the resolver
    /// understands: 1x2, totals, asian handicap, draw-no-bet, and their
    /// first-half variants.
    pub fn demo_catalog(event_id: &str, home: &str, away: &str) -> EventCatalog {
        let group = |description: &str, outcomes: Vec<(&str, &str, f64)>| MarketGroup {
            description: description.to_string(),
            outcomes: outcomes
                .into_iter()
                .map(|(id, label, odds)| OutcomeQuote {
                    id: id.to_string(),
                    description: label.to_string(),
                    points: None,
                    odds,
                })
                .collect(),
        };

        EventCatalog {
            event_id: event_id.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            markets: vec![
                group(
                    "1x2",
                    vec![("1", "Home", 2.15), ("2", "Draw", 3.25), ("3", "Away", 3.40)],
                ),
                group(
                    "1st half - 1x2",
                    vec![("1", "Home", 2.80), ("2", "Draw", 2.10), ("3", "Away", 4.20)],
                ),
                group(
                    "over/under",
                    vec![
                        ("12", "Over 1.5", 1.30),
                        ("13", "Under 1.5", 3.45),
                        ("12", "Over 2.5", 1.85),
                        ("13", "Under 2.5", 1.95),
                        ("12", "Over 3.5", 3.10),
                        ("13", "Under 3.5", 1.35),
                    ],
                ),
                group(
                    "1st half - o/u",
                    vec![
                        ("12", "Over 0.5", 1.60),
                        ("13", "Under 0.5", 2.30),
                        ("12", "Over 1.5", 3.10),
                        ("13", "Under 1.5", 1.35),
                    ],
                ),
                group(
                    "asian handicap",
                    vec![
                        ("1714", "Home (-0.5)", 2.05),
                        ("1715", "Away (+0.5)", 1.82),
                        ("1714", "Home (-1.0)", 2.90),
                        ("1715", "Away (+1.0)", 1.40),
                    ],
                ),
                group(
                    "1st half - asian handicap",
                    vec![("1714", "Home (-0.25)", 2.05), ("1715", "Away (+0.25)", 1.75)],
                ),
                group("draw no bet", vec![("4", "Home", 1.55), ("5", "Away", 2.45)]),
            ],
        }
    }
}

fn normalize(team: &str) -> String {
    team.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn teams_match(wanted: &str, listed: &str) -> bool {
    let wanted = normalize(wanted);
    let listed = normalize(listed);
    !wanted.is_empty() && (listed.contains(&wanted) || wanted.contains(&listed))
}

#[async_trait]
impl Bookmaker for PaperBook {
    async fn search_event(
        &self,
        home: &str,
        away: &str,
        _starts: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        Ok(self
            .catalogs
            .iter()
            .find(|c| teams_match(home, &c.home_team) && teams_match(away, &c.away_team))
            .map(|c| c.event_id.clone()))
    }

    async fn event_catalog(&self, event_id: &str) -> Result<EventCatalog> {
        self.catalogs
            .iter()
            .find(|c| c.event_id == event_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown event: {event_id}"))
    }

    async fn execute_bet(
        &self,
        account: &AccountProfile,
        session: Option<Session>,
        request: &BetRequest,
    ) -> Result<BetReceipt, ExecError> {
        if let Some(error) = {
            let mut scripted = self.scripted_failures.lock().unwrap();
            if scripted.is_empty() {
                None
            } else {
                Some(scripted.remove(0))
            }
        } {
            return Err(error);
        }

        match session {
            Some(s) if !s.is_expired(Utc::now()) => {}
            _ => return Err(ExecError::SessionExpired),
        }

        let receipt = BetReceipt::paper();
        self.bets.lock().unwrap().push(PaperBet {
            username: account.username.clone(),
            request: request.clone(),
            receipt: receipt.clone(),
        });
        Ok(receipt)
    }

    async fn renew_session(&self, _account: &AccountProfile) -> Result<Session, ExecError> {
        *self.renewals.lock().unwrap() += 1;
        Ok(Session {
            token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + self.session_ttl,
            balance: self.login_balance,
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_account() -> AccountProfile {
        AccountProfile {
            username: "paper1".into(),
            password_env: "PAPER1_PASSWORD".into(),
            proxy: None,
            active: true,
            max_concurrent_bets: 3,
            min_balance: 0.0,
        }
    }

    fn make_request() -> BetRequest {
        BetRequest {
            event_id: "ev-1".into(),
            outcome_id: "1714".into(),
            odds: 2.05,
            stake: 20.0,
        }
    }

    #[tokio::test]
    async fn test_search_matches_normalized_teams() {
        let book = PaperBook::new(vec![PaperBook::demo_catalog("ev-1", "Corinthians", "Fortaleza")]);
        let found = book
            .search_event("corinthians", "FORTALEZA", None)
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("ev-1"));
        let missing = book.search_event("Flamengo", "Palmeiras", None).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_execute_requires_live_session() {
        let book = PaperBook::new(vec![]);
        let account = make_account();
        let err = book
            .execute_bet(&account, None, &make_request())
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());

        let session = book.renew_session(&account).await.unwrap();
        let receipt = book
            .execute_bet(&account, Some(session.clone()), &make_request())
            .await
            .unwrap();
        assert!(receipt.bet_id.starts_with("paper-"));
        assert_eq!(book.placed_bets().len(), 1);
        assert_eq!(book.renewal_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures_drain_in_order() {
        let book = PaperBook::new(vec![]);
        let account = make_account();
        let session = book.renew_session(&account).await.unwrap();

        book.fail_next_execution(ExecError::Transport("timeout".into()));
        book.fail_next_execution(ExecError::SessionExpired);

        let first = book
            .execute_bet(&account, Some(session.clone()), &make_request())
            .await
            .unwrap_err();
        assert!(matches!(first, ExecError::Transport(_)));

        let second = book
            .execute_bet(&account, Some(session.clone()), &make_request())
            .await
            .unwrap_err();
        assert!(second.is_auth_failure());

        assert!(book
            .execute_bet(&account, Some(session.clone()), &make_request())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let book = PaperBook::new(vec![]).with_session_ttl(Duration::seconds(-1));
        let account = make_account();
        let stale = book.renew_session(&account).await.unwrap();
        let err = book
            .execute_bet(&account, Some(stale.clone()), &make_request())
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_login_balance_reported() {
        let book = PaperBook::new(vec![]).with_login_balance(500.0);
        let session = book.renew_session(&make_account()).await.unwrap();
        assert_eq!(session.balance, Some(500.0));
    }

    #[test]
    fn test_demo_catalog_has_expected_groups() {
        let catalog = PaperBook::demo_catalog("ev-1", "A", "B");
        let descriptions: Vec<&str> = catalog
            .markets
            .iter()
            .map(|m| m.description.as_str())
            .collect();
        assert!(descriptions.contains(&"1x2"));
        assert!(descriptions.contains(&"1st half - o/u"));
        assert!(descriptions.contains(&"draw no bet"));
    }
}
