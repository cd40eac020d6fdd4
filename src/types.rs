//! Shared types for the BETALERT engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that pricing, resolver,
//! and dispatch modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Bet classification enums
// ---------------------------------------------------------------------------

/// Bet category on the reference feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LineType {
    Moneyline,
    Spread,
    Total,
}

impl fmt::Display for LineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineType::Moneyline => write!(f, "moneyline"),
            LineType::Spread => write!(f, "spread"),
            LineType::Total => write!(f, "total"),
        }
    }
}

/// Parse the spellings the reference feed actually sends.
impl std::str::FromStr for LineType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "moneyline" | "money_line" | "ml" => Ok(LineType::Moneyline),
            "spread" | "handicap" => Ok(LineType::Spread),
            "total" | "totals" | "over_under" => Ok(LineType::Total),
            other => anyhow::bail!("Unknown line type: {other}"),
        }
    }
}

/// Outcome side within a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutcomeSide {
    Home,
    Away,
    Draw,
    Over,
    Under,
}

impl fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeSide::Home => write!(f, "home"),
            OutcomeSide::Away => write!(f, "away"),
            OutcomeSide::Draw => write!(f, "draw"),
            OutcomeSide::Over => write!(f, "over"),
            OutcomeSide::Under => write!(f, "under"),
        }
    }
}

impl std::str::FromStr for OutcomeSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "home" | "1" => Ok(OutcomeSide::Home),
            "away" | "2" => Ok(OutcomeSide::Away),
            "draw" | "x" => Ok(OutcomeSide::Draw),
            "over" => Ok(OutcomeSide::Over),
            "under" => Ok(OutcomeSide::Under),
            other => anyhow::bail!("Unknown outcome side: {other}"),
        }
    }
}

/// Match period a bet applies to. The bookmaker lists distinct market
/// groups for full-time and first-half versions of the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchHalf {
    FullTime,
    FirstHalf,
}

impl fmt::Display for MatchHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchHalf::FullTime => write!(f, "full-time"),
            MatchHalf::FirstHalf => write!(f, "1st-half"),
        }
    }
}

/// Sport. Naming and outcome-id conventions on the bookmaker differ
/// per sport, so the resolver keys its lookup tables on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Soccer,
    Basketball,
}

impl Sport {
    /// Map the reference feed's numeric sport id.
    pub fn from_feed_id(id: u32) -> Option<Sport> {
        match id {
            1 => Some(Sport::Soccer),
            2 => Some(Sport::Basketball),
            _ => None,
        }
    }

    /// Whether this sport's moneyline market carries a draw outcome.
    pub fn has_draw(&self) -> bool {
        matches!(self, Sport::Soccer)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sport::Soccer => write!(f, "soccer"),
            Sport::Basketball => write!(f, "basketball"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// A mispricing alert from the reference feed.
///
/// Immutable once created; consumed exactly once by `BetEngine::notify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id assigned by the feed.
    pub id: String,
    /// Reference-market event identifier.
    pub event_id: String,
    pub home: String,
    pub away: String,
    pub sport: Sport,
    pub line_type: LineType,
    pub outcome: OutcomeSide,
    /// Line value for spreads/totals; absent for moneylines.
    pub points: Option<f64>,
    pub half: MatchHalf,
    /// Reference-side decimal prices for the relevant outcome set,
    /// snapshotted at alert time.
    pub prices: BTreeMap<OutcomeSide, f64>,
    /// Scheduled match kick-off.
    pub starts: DateTime<Utc>,
}

impl Alert {
    /// Check the fields every downstream step relies on.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.home.trim().is_empty() || self.away.trim().is_empty() {
            return Err(EngineError::InvalidAlert("missing team names".into()));
        }
        if self.event_id.trim().is_empty() {
            return Err(EngineError::InvalidAlert("missing event id".into()));
        }
        match self.line_type {
            LineType::Spread | LineType::Total if self.points.is_none() => Err(
                EngineError::InvalidAlert(format!("{} alert without points", self.line_type)),
            ),
            LineType::Moneyline if self.outcome == OutcomeSide::Draw && !self.sport.has_draw() => {
                Err(EngineError::InvalidAlert(format!(
                    "draw outcome for {}",
                    self.sport
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether the underlying match has already kicked off.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts <= now
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs {} [{} {} {}{}]",
            self.home,
            self.away,
            self.half,
            self.line_type,
            self.outcome,
            self.points.map(|p| format!(" @ {p}")).unwrap_or_default(),
        )
    }
}

// ---------------------------------------------------------------------------
// Resolved quote and bet order
// ---------------------------------------------------------------------------

/// A concrete tradeable selection on the bookmaker, resolved from an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Bookmaker outcome id to submit with the bet slip.
    pub outcome_id: String,
    /// Quoted decimal odds.
    pub odds: f64,
    /// Actual line matched; may differ from the alert's requested points.
    pub points: Option<f64>,
}

/// Unit of dispatch: a resolved, EV-approved selection waiting for an
/// account. Stake is NOT stored here; it depends on the assigned
/// account's bankroll and is computed at assignment time.
#[derive(Debug, Clone)]
pub struct BetOrder {
    pub id: Uuid,
    pub alert: Alert,
    pub quote: MarketQuote,
    /// Bookmaker event id the quote belongs to.
    pub book_event_id: String,
    /// No-vig price for the chosen outcome (policy devig method).
    pub fair_price: f64,
    /// Expected value at enqueue time, in percent.
    pub ev_pct: f64,
    pub enqueued_at: DateTime<Utc>,
    /// Completed dispatch passes so far.
    pub attempts: u32,
}

impl BetOrder {
    pub fn new(
        alert: Alert,
        quote: MarketQuote,
        book_event_id: String,
        fair_price: f64,
        ev_pct: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert,
            quote,
            book_event_id,
            fair_price,
            ev_pct,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Fair win probability implied by the no-vig price.
    pub fn win_probability(&self) -> f64 {
        1.0 / self.fair_price
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Static account configuration. Mutable session/balance/in-flight state
/// lives in the pool arena, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub username: String,
    /// Env-var name holding the password; resolved by the execution
    /// adapter at login time, never stored in the config itself.
    pub password_env: String,
    #[serde(default)]
    pub proxy: Option<String>,
    pub active: bool,
    pub max_concurrent_bets: u32,
    pub min_balance: f64,
}

/// An authenticated bookmaker session for one account.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Balance observed during login, used to refresh pool tracking.
    pub balance: Option<f64>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Domain-specific error types for BETALERT.
///
/// Most variants are dropped-and-logged at the granularity of a single
/// alert or order; none of them may halt the worker loop. `Config` is
/// the only startup-fatal kind.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid alert: {0}")]
    InvalidAlert(String),

    #[error("Match already started: {0}")]
    StaleMatch(String),

    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("Insufficient price data: {0}")]
    InsufficientPriceData(String),

    #[error("Session expired for account {0}")]
    SessionExpired(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
