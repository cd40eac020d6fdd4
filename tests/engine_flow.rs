//! End-to-end engine tests against the paper bookmaker.
//!
//! Exercises the full decision pipeline (alert intake, dedup, market
//! resolution, devig, EV gating, queueing, worker dispatch) with
//! no network anywhere.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use betalert::book::paper::PaperBook;
use betalert::config::{AppConfig, BetSettings, EngineConfig};
use betalert::engine::BetEngine;
use betalert::pricing::devig::DevigMethod;
use betalert::types::{AccountProfile, Alert, LineType, MatchHalf, OutcomeSide, Sport};

fn make_config(accounts: Vec<AccountProfile>, global_cap: u32) -> AppConfig {
    AppConfig {
        engine: EngineConfig {
            max_total_concurrent_bets: global_cap,
            immediate_dispatch: false,
            // Short requeue delays so retry behaviour is observable in-test.
            global_cap_delay_secs: 1,
            no_account_delay_secs: 1,
            dedup_capacity: 2000,
            stale_after_secs: 300,
            track_balances: true,
        },
        bet_settings: BetSettings {
            min_ev: 5.0,
            kelly_fraction: 0.3,
            min_stake: 10.0,
            max_stake: 1_000_000.0,
            max_book_odds: 3.0,
            bankroll: 1000.0,
            devig_method: DevigMethod::Power,
            odds_tiers: Vec::new(),
        },
        accounts,
    }
}

fn make_account(username: &str) -> AccountProfile {
    AccountProfile {
        username: username.into(),
        password_env: format!("{}_PASSWORD", username.to_uppercase()),
        proxy: None,
        active: true,
        max_concurrent_bets: 3,
        min_balance: 0.0,
    }
}

fn make_book() -> Arc<PaperBook> {
    Arc::new(PaperBook::new(vec![PaperBook::demo_catalog(
        "book-ev-1",
        "Corinthians",
        "Fortaleza",
    )]))
}

/// Spread alert: home -0.5 at reference prices that devig to a fair
/// home price near 1.89, against the demo catalog's 2.05 quote: a
/// comfortable positive edge.
fn spread_alert(event_id: &str) -> Alert {
    Alert {
        id: format!("alert-{event_id}"),
        event_id: event_id.into(),
        home: "Corinthians".into(),
        away: "Fortaleza".into(),
        sport: Sport::Soccer,
        line_type: LineType::Spread,
        outcome: OutcomeSide::Home,
        points: Some(-0.5),
        half: MatchHalf::FullTime,
        prices: BTreeMap::from([(OutcomeSide::Home, 1.83), (OutcomeSide::Away, 2.05)]),
        starts: Utc::now() + Duration::hours(2),
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: StdDuration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test]
async fn test_alert_to_placed_bet() {
    let book = make_book();
    let engine = Arc::new(
        BetEngine::new(&make_config(vec![make_account("acc1")], 5), book.clone(), None).unwrap(),
    );

    assert!(engine.notify(spread_alert("ev-1001")).await);
    assert_eq!(engine.queue_len(), 1);

    let worker = Arc::clone(&engine).spawn_worker();
    assert!(
        wait_until(|| book.placed_bets().len() == 1, StdDuration::from_secs(3)).await,
        "bet was not placed in time"
    );

    let bets = book.placed_bets();
    let bet = &bets[0];
    assert_eq!(bet.username, "acc1");
    assert_eq!(bet.request.event_id, "book-ev-1");
    assert_eq!(bet.request.outcome_id, "1714");
    assert_eq!(bet.request.odds, 2.05);
    // Bankroll 1000, 0.3 Kelly on an ~7.5% full-Kelly edge, rounded to
    // the nearest 10.
    assert_eq!(bet.request.stake, 20.0);

    // No session existed up front, so exactly one renewal happened.
    assert_eq!(book.renewal_count(), 1);
    // Stake debited from the tracked balance.
    assert_eq!(engine.pool().balance(0), 980.0);

    engine.shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_global_cap_requeues_then_places_after_release() {
    let book = make_book();
    let engine = Arc::new(
        BetEngine::new(&make_config(vec![make_account("acc1")], 1), book.clone(), None).unwrap(),
    );

    // Simulate a bet already in flight so the global cap (1) is met.
    assert!(engine.pool().try_acquire(0));

    assert!(engine.notify(spread_alert("ev-1001")).await);
    let worker = Arc::clone(&engine).spawn_worker();

    // The order must keep cycling through requeues without ever being
    // placed while the cap is held.
    tokio::time::sleep(StdDuration::from_millis(1500)).await;
    assert!(book.placed_bets().is_empty());
    // The capped dispatcher never reserved a slot of its own: the only
    // in-flight count is the phantom one.
    assert_eq!(engine.pool().global_in_flight(), 1);

    // Release the phantom in-flight bet; the delayed retry should land.
    engine.pool().release(0);
    assert!(
        wait_until(|| book.placed_bets().len() == 1, StdDuration::from_secs(5)).await,
        "order was not placed after capacity freed"
    );

    engine.shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_two_alerts_two_accounts() {
    let book = Arc::new(PaperBook::new(vec![
        PaperBook::demo_catalog("book-ev-1", "Corinthians", "Fortaleza"),
        PaperBook::demo_catalog("book-ev-2", "Fluminense", "Al Hilal SFC"),
    ]));
    let engine = Arc::new(
        BetEngine::new(
            &make_config(vec![make_account("acc1"), make_account("acc2")], 5),
            book.clone(),
            None,
        )
        .unwrap(),
    );

    let mut second = spread_alert("ev-2002");
    second.home = "Fluminense".into();
    second.away = "Al Hilal SFC".into();

    assert!(engine.notify(spread_alert("ev-1001")).await);
    assert!(engine.notify(second).await);

    let worker = Arc::clone(&engine).spawn_worker();
    assert!(
        wait_until(|| book.placed_bets().len() == 2, StdDuration::from_secs(3)).await,
        "both bets should place"
    );

    // Scanning is fixed-order and both fit under acc1's per-account cap.
    let bets = book.placed_bets();
    assert!(bets.iter().all(|b| b.username == "acc1"));

    engine.shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_duplicate_and_stale_alerts_never_queue() {
    let engine = Arc::new(
        BetEngine::new(&make_config(vec![make_account("acc1")], 5), make_book(), None).unwrap(),
    );

    assert!(engine.notify(spread_alert("ev-1001")).await);
    // Same (event, line type): dropped by dedup.
    assert!(!engine.notify(spread_alert("ev-1001")).await);

    // Started 10 minutes ago: stale.
    let mut stale = spread_alert("ev-9999");
    stale.starts = Utc::now() - Duration::minutes(10);
    assert!(!engine.notify(stale).await);

    assert_eq!(engine.queue_len(), 1);
}

#[tokio::test]
async fn test_clear_queue_discards_pending_orders() {
    let book = make_book();
    let engine = Arc::new(
        BetEngine::new(&make_config(vec![make_account("acc1")], 5), book.clone(), None).unwrap(),
    );

    assert!(engine.notify(spread_alert("ev-1001")).await);
    assert_eq!(engine.clear_queue(), 1);

    // A worker started afterwards finds nothing to do.
    let worker = Arc::clone(&engine).spawn_worker();
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    assert!(book.placed_bets().is_empty());

    engine.shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_total_alert_resolves_adjusted_line() {
    // Requesting total 2.3 must trade the listed 2.5 line.
    let book = make_book();
    let engine = Arc::new(
        BetEngine::new(&make_config(vec![make_account("acc1")], 5), book.clone(), None).unwrap(),
    );

    let alert = Alert {
        id: "alert-total".into(),
        event_id: "ev-3003".into(),
        home: "Corinthians".into(),
        away: "Fortaleza".into(),
        sport: Sport::Soccer,
        line_type: LineType::Total,
        outcome: OutcomeSide::Over,
        points: Some(2.3),
        half: MatchHalf::FullTime,
        // Reference prices long enough on Over to clear the EV bar
        // against the catalog's 1.85 quote.
        prices: BTreeMap::from([(OutcomeSide::Over, 1.65), (OutcomeSide::Under, 2.35)]),
        starts: Utc::now() + Duration::hours(2),
    };
    assert!(engine.notify(alert).await);

    let worker = Arc::clone(&engine).spawn_worker();
    assert!(
        wait_until(|| book.placed_bets().len() == 1, StdDuration::from_secs(3)).await,
        "total bet should place"
    );
    let bets = book.placed_bets();
    assert_eq!(bets[0].request.outcome_id, "12");
    assert_eq!(bets[0].request.odds, 1.85);

    engine.shutdown();
    worker.await.unwrap();
}
