//! Market resolution.
//!
//! Maps a canonical bet description (line type, outcome, points, half,
//! sport) to a concrete tradeable outcome in a bookmaker event catalog.
//! Market-group naming and outcome-id constants vary per sport and per
//! half, so both live in lookup tables here rather than being built up
//! by string concatenation at the call sites.
//!
//! Line search: requested points are rounded to the nearest 0.5 and the
//! catalog is probed ascending then descending in 0.5 steps, up to four
//! steps out; among the lines found, the one closest to the ORIGINAL
//! requested points wins, and its actual value is reported back as the
//! adjusted line. A handicap of zero is a special case: it resolves
//! against the two-outcome draw-no-bet market, falling back to a
//! handicap at 0.0 where the sport has no such market.
//!
//! Read-only against the supplied catalog; no I/O.

use tracing::debug;

use crate::book::{EventCatalog, MarketGroup};
use crate::types::{Alert, EngineError, LineType, MarketQuote, MatchHalf, OutcomeSide, Sport};

/// Tolerance for all point and odds comparisons.
const POINT_TOLERANCE: f64 = 1e-2;

/// Half-goal step the bookmaker lists lines in.
const LINE_STEP: f64 = 0.5;

/// How many steps beyond the rounded line the search probes each way.
const SEARCH_STEPS: i32 = 4;

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// The canonical description of what to back, independent of any
/// bookmaker's catalog conventions.
#[derive(Debug, Clone)]
pub struct BetSelection {
    pub sport: Sport,
    pub line_type: LineType,
    pub outcome: OutcomeSide,
    pub points: Option<f64>,
    pub half: MatchHalf,
}

impl From<&Alert> for BetSelection {
    fn from(alert: &Alert) -> Self {
        Self {
            sport: alert.sport,
            line_type: alert.line_type,
            outcome: alert.outcome,
            points: alert.points,
            half: alert.half,
        }
    }
}

// ---------------------------------------------------------------------------
// Naming tables
// ---------------------------------------------------------------------------

/// Market family on the bookmaker side. Spread splits into handicap
/// and draw-no-bet depending on the requested points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarketKind {
    Moneyline,
    Total,
    Handicap,
    DrawNoBet,
}

/// Catalog group description for (sport, market, half).
fn group_description(sport: Sport, kind: MarketKind, half: MatchHalf) -> Option<&'static str> {
    use MarketKind::*;
    use MatchHalf::*;
    use Sport::*;

    Some(match (sport, kind, half) {
        (Soccer, Moneyline, FullTime) => "1x2",
        (Soccer, Moneyline, FirstHalf) => "1st half - 1x2",
        (Soccer, Total, FullTime) => "over/under",
        (Soccer, Total, FirstHalf) => "1st half - o/u",
        (Soccer, Handicap, FullTime) => "asian handicap",
        (Soccer, Handicap, FirstHalf) => "1st half - asian handicap",
        (Soccer, DrawNoBet, FullTime) => "draw no bet",
        (Soccer, DrawNoBet, FirstHalf) => "1st half - draw no bet",
        (Basketball, Moneyline, FullTime) => "winner",
        (Basketball, Moneyline, FirstHalf) => "1st half - winner",
        (Basketball, Total, FullTime) => "over/under",
        (Basketball, Total, FirstHalf) => "1st half - o/u",
        (Basketball, Handicap, FullTime) => "handicap",
        (Basketball, Handicap, FirstHalf) => "1st half - handicap",
        // Basketball has no draw, so no draw-no-bet market either.
        (Basketball, DrawNoBet, _) => return None,
    })
}

/// Bookmaker outcome-id constant for (sport, market, outcome).
fn outcome_id(sport: Sport, kind: MarketKind, outcome: OutcomeSide) -> Option<&'static str> {
    use MarketKind::*;
    use OutcomeSide::*;
    use Sport::*;

    Some(match (sport, kind, outcome) {
        (Soccer, Moneyline, Home) => "1",
        (Soccer, Moneyline, Draw) => "2",
        (Soccer, Moneyline, Away) => "3",
        (Basketball, Moneyline, Home) => "1",
        (Basketball, Moneyline, Away) => "2",
        (_, Total, Over) => "12",
        (_, Total, Under) => "13",
        (_, Handicap, Home) => "1714",
        (_, Handicap, Away) => "1715",
        (Soccer, DrawNoBet, Home) => "4",
        (Soccer, DrawNoBet, Away) => "5",
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a selection against a catalog, or fail with `MarketNotFound`.
pub fn resolve(selection: &BetSelection, catalog: &EventCatalog) -> Result<MarketQuote, EngineError> {
    match selection.line_type {
        LineType::Moneyline => resolve_moneyline(selection, catalog),
        LineType::Total => {
            let points = required_points(selection)?;
            resolve_line(selection, catalog, MarketKind::Total, points)
        }
        LineType::Spread => {
            let points = required_points(selection)?;
            if points.abs() < POINT_TOLERANCE {
                resolve_draw_no_bet(selection, catalog)
            } else {
                resolve_line(selection, catalog, MarketKind::Handicap, points)
            }
        }
    }
}

fn required_points(selection: &BetSelection) -> Result<f64, EngineError> {
    selection.points.ok_or_else(|| {
        EngineError::InvalidAlert(format!("{} selection without points", selection.line_type))
    })
}

fn find_group<'a>(catalog: &'a EventCatalog, description: &str) -> Option<&'a MarketGroup> {
    catalog
        .markets
        .iter()
        .find(|m| m.description.eq_ignore_ascii_case(description))
}

fn resolve_moneyline(
    selection: &BetSelection,
    catalog: &EventCatalog,
) -> Result<MarketQuote, EngineError> {
    let kind = MarketKind::Moneyline;
    let description = group_description(selection.sport, kind, selection.half)
        .ok_or_else(|| market_not_found(selection, "no moneyline market for sport"))?;
    let wanted_id = outcome_id(selection.sport, kind, selection.outcome)
        .ok_or_else(|| market_not_found(selection, "outcome not offered"))?;

    let group = find_group(catalog, description)
        .ok_or_else(|| market_not_found(selection, description))?;

    // Exact id match only; moneylines carry no line to search around.
    group
        .outcomes
        .iter()
        .find(|o| o.id == wanted_id)
        .map(|o| MarketQuote {
            outcome_id: o.id.clone(),
            odds: o.odds,
            points: None,
        })
        .ok_or_else(|| market_not_found(selection, description))
}

/// Shared nearest-line search for totals and non-zero handicaps.
fn resolve_line(
    selection: &BetSelection,
    catalog: &EventCatalog,
    kind: MarketKind,
    requested: f64,
) -> Result<MarketQuote, EngineError> {
    let description = group_description(selection.sport, kind, selection.half)
        .ok_or_else(|| market_not_found(selection, "no such market for sport"))?;
    let wanted_id = outcome_id(selection.sport, kind, selection.outcome)
        .ok_or_else(|| market_not_found(selection, "outcome not offered"))?;
    let group = find_group(catalog, description)
        .ok_or_else(|| market_not_found(selection, description))?;

    let rounded = (requested / LINE_STEP).round() * LINE_STEP;
    let mut best: Option<(f64, f64)> = None; // (actual points, odds)

    for candidate in candidate_lines(rounded, kind == MarketKind::Total) {
        let hit = group.outcomes.iter().find(|o| {
            o.id == wanted_id
                && o.line_points()
                    .is_some_and(|p| (p - candidate).abs() < POINT_TOLERANCE)
        });
        if let Some(outcome) = hit {
            let actual = outcome.line_points().unwrap_or(candidate);
            let improved = match best {
                Some((current, _)) => (actual - requested).abs() < (current - requested).abs(),
                None => true,
            };
            if improved {
                best = Some((actual, outcome.odds));
            }
        }
    }

    match best {
        Some((points, odds)) => {
            debug!(
                requested,
                matched = points,
                odds,
                market = description,
                "Line resolved"
            );
            Ok(MarketQuote {
                outcome_id: wanted_id.to_string(),
                odds,
                points: Some(points),
            })
        }
        None => Err(market_not_found(selection, description)),
    }
}

/// Candidate lines around the rounded request: the rounded value, then
/// ascending steps, then descending. Totals never go negative.
fn candidate_lines(rounded: f64, forbid_negative: bool) -> Vec<f64> {
    let mut candidates = Vec::with_capacity((2 * SEARCH_STEPS + 1) as usize);
    candidates.push(rounded);
    for step in 1..=SEARCH_STEPS {
        candidates.push(rounded + step as f64 * LINE_STEP);
    }
    for step in 1..=SEARCH_STEPS {
        candidates.push(rounded - step as f64 * LINE_STEP);
    }
    if forbid_negative {
        candidates.retain(|c| *c >= 0.0);
    }
    candidates
}

/// Handicap of zero: back the team in the draw-no-bet market, or at a
/// 0.0 handicap where the bookmaker lists no DNB group for the sport.
fn resolve_draw_no_bet(
    selection: &BetSelection,
    catalog: &EventCatalog,
) -> Result<MarketQuote, EngineError> {
    if let Some(description) = group_description(selection.sport, MarketKind::DrawNoBet, selection.half)
    {
        if let Some(group) = find_group(catalog, description) {
            let wanted_id = outcome_id(selection.sport, MarketKind::DrawNoBet, selection.outcome)
                .ok_or_else(|| market_not_found(selection, "outcome not offered"))?;
            if let Some(outcome) = group.outcomes.iter().find(|o| o.id == wanted_id) {
                debug!(market = description, odds = outcome.odds, "Zero handicap resolved as DNB");
                return Ok(MarketQuote {
                    outcome_id: outcome.id.clone(),
                    odds: outcome.odds,
                    points: Some(0.0),
                });
            }
        }
    }

    // No DNB market; a handicap priced exactly at zero is equivalent.
    // Only the level line qualifies; a half-goal line is a different bet.
    let description = group_description(selection.sport, MarketKind::Handicap, selection.half)
        .ok_or_else(|| market_not_found(selection, "no handicap market for sport"))?;
    let wanted_id = outcome_id(selection.sport, MarketKind::Handicap, selection.outcome)
        .ok_or_else(|| market_not_found(selection, "outcome not offered"))?;
    let group = find_group(catalog, description)
        .ok_or_else(|| market_not_found(selection, description))?;

    group
        .outcomes
        .iter()
        .find(|o| {
            o.id == wanted_id && o.line_points().is_some_and(|p| p.abs() < POINT_TOLERANCE)
        })
        .map(|o| {
            debug!(market = description, odds = o.odds, "Zero handicap resolved at level line");
            MarketQuote {
                outcome_id: o.id.clone(),
                odds: o.odds,
                points: Some(0.0),
            }
        })
        .ok_or_else(|| market_not_found(selection, "no level handicap line"))
}

fn market_not_found(selection: &BetSelection, detail: &str) -> EngineError {
    EngineError::MarketNotFound(format!(
        "{} {} {} {}: {detail}",
        selection.sport, selection.half, selection.line_type, selection.outcome
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
