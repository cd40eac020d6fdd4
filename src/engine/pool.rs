//! Account pool.
//!
//! Arena-style registry of trading accounts: static profiles plus
//! per-account mutable state (balance, session, in-flight count), each
//! behind its own mutex so that exactly one mutation path touches an
//! account at a time. Accounts are referenced by index and live for the
//! process lifetime; deactivation, never destruction.

use std::sync::Mutex;
use tracing::debug;

use crate::types::{AccountProfile, Session};

/// Index-based account reference.
pub type AccountId = usize;

/// Mutable per-account state.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub balance: f64,
    pub in_flight: u32,
    pub session: Option<Session>,
}

struct AccountSlot {
    profile: AccountProfile,
    state: Mutex<AccountState>,
}

pub struct AccountPool {
    slots: Vec<AccountSlot>,
    global_cap: u32,
    track_balances: bool,
}

impl AccountPool {
    /// Build the pool. Every account starts with the configured default
    /// bankroll until a session renewal reports a real balance.
    pub fn new(
        profiles: Vec<AccountProfile>,
        global_cap: u32,
        track_balances: bool,
        default_bankroll: f64,
    ) -> Self {
        let slots = profiles
            .into_iter()
            .map(|profile| AccountSlot {
                profile,
                state: Mutex::new(AccountState {
                    balance: default_bankroll,
                    in_flight: 0,
                    session: None,
                }),
            })
            .collect();
        Self {
            slots,
            global_cap,
            track_balances,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn global_cap(&self) -> u32 {
        self.global_cap
    }

    pub fn track_balances(&self) -> bool {
        self.track_balances
    }

    pub fn profile(&self, id: AccountId) -> &AccountProfile {
        &self.slots[id].profile
    }

    /// Sum of in-flight bets across all accounts. Advisory: slots are
    /// locked one at a time, so the sum is a best-effort snapshot, not
    /// a transactional guarantee.
    pub fn global_in_flight(&self) -> u32 {
        self.slots
            .iter()
            .map(|slot| slot.state.lock().unwrap().in_flight)
            .sum()
    }

    /// Whether the advisory global snapshot has reached the cap.
    pub fn at_global_cap(&self) -> bool {
        self.global_in_flight() >= self.global_cap
    }

    /// Reserve one bet slot on an account. Increments the in-flight
    /// counter BEFORE any execution happens so a concurrent assignment
    /// cannot push the account past its limit. Returns false if the
    /// account is inactive, saturated, or under its balance floor.
    pub fn try_acquire(&self, id: AccountId) -> bool {
        let slot = &self.slots[id];
        if !slot.profile.active {
            return false;
        }
        let mut state = slot.state.lock().unwrap();
        if state.in_flight >= slot.profile.max_concurrent_bets {
            return false;
        }
        if self.track_balances && state.balance < slot.profile.min_balance {
            debug!(
                account = %slot.profile.username,
                balance = state.balance,
                floor = slot.profile.min_balance,
                "Account under balance floor"
            );
            return false;
        }
        state.in_flight += 1;
        true
    }

    /// Return a reserved slot. Called unconditionally after execution,
    /// whatever the outcome.
    pub fn release(&self, id: AccountId) {
        let mut state = self.slots[id].state.lock().unwrap();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Deduct a placed stake from the tracked balance. No-op when
    /// balance tracking is disabled.
    pub fn debit(&self, id: AccountId, stake: f64) {
        if !self.track_balances {
            return;
        }
        let mut state = self.slots[id].state.lock().unwrap();
        state.balance -= stake;
        debug!(
            account = %self.slots[id].profile.username,
            stake,
            balance = state.balance,
            "Balance debited"
        );
    }

    pub fn balance(&self, id: AccountId) -> f64 {
        self.slots[id].state.lock().unwrap().balance
    }

    /// Current session snapshot for an account.
    pub fn session(&self, id: AccountId) -> Option<Session> {
        self.slots[id].state.lock().unwrap().session.clone()
    }

    /// Store a freshly renewed session; adopts the login-reported
    /// balance when the bookmaker exposes one.
    pub fn install_session(&self, id: AccountId, session: Session) {
        let mut state = self.slots[id].state.lock().unwrap();
        if let Some(balance) = session.balance {
            state.balance = balance;
        }
        state.session = Some(session);
    }

    /// Full state snapshot, for reporting.
    pub fn state(&self, id: AccountId) -> AccountState {
        self.slots[id].state.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_profile(username: &str, active: bool, max_bets: u32, min_balance: f64) -> AccountProfile {
        AccountProfile {
            username: username.into(),
            password_env: format!("{}_PASSWORD", username.to_uppercase()),
            proxy: None,
            active,
            max_concurrent_bets: max_bets,
            min_balance,
        }
    }

    fn make_pool(global_cap: u32) -> AccountPool {
        AccountPool::new(
            vec![
                make_profile("acc1", true, 2, 100.0),
                make_profile("acc2", true, 1, 100.0),
                make_profile("acc3", false, 3, 100.0),
            ],
            global_cap,
            true,
            1000.0,
        )
    }

    #[test]
    fn test_acquire_respects_per_account_limit() {
        let pool = make_pool(10);
        assert!(pool.try_acquire(0));
        assert!(pool.try_acquire(0));
        assert!(!pool.try_acquire(0)); // max 2
        pool.release(0);
        assert!(pool.try_acquire(0));
    }

    #[test]
    fn test_inactive_account_never_acquired() {
        let pool = make_pool(10);
        assert!(!pool.try_acquire(2));
    }

    #[test]
    fn test_balance_floor_blocks_acquisition() {
        let pool = make_pool(10);
        pool.debit(1, 950.0); // balance 50 < floor 100
        assert!(!pool.try_acquire(1));
    }

    #[test]
    fn test_balance_floor_ignored_when_tracking_off() {
        let pool = AccountPool::new(vec![make_profile("acc1", true, 2, 100.0)], 5, false, 1000.0);
        pool.debit(0, 10_000.0); // no-op
        assert_eq!(pool.balance(0), 1000.0);
        assert!(pool.try_acquire(0));
    }

    #[test]
    fn test_global_in_flight_snapshot() {
        let pool = make_pool(10);
        assert_eq!(pool.global_in_flight(), 0);
        pool.try_acquire(0);
        pool.try_acquire(1);
        assert_eq!(pool.global_in_flight(), 2);
        assert!(!pool.at_global_cap());
        pool.try_acquire(0);
        assert_eq!(pool.global_in_flight(), 3);
    }

    #[test]
    fn test_at_global_cap() {
        let pool = make_pool(1);
        assert!(!pool.at_global_cap());
        pool.try_acquire(0);
        assert!(pool.at_global_cap());
    }

    #[test]
    fn test_release_never_underflows() {
        let pool = make_pool(10);
        pool.release(0);
        assert_eq!(pool.global_in_flight(), 0);
    }

    #[test]
    fn test_session_install_refreshes_balance() {
        let pool = make_pool(10);
        let session = Session {
            token: "tok".into(),
            expires_at: Utc::now() + Duration::hours(1),
            balance: Some(750.0),
        };
        pool.install_session(0, session);
        assert_eq!(pool.balance(0), 750.0);
        assert_eq!(pool.session(0).unwrap().token, "tok");
        assert!(pool.session(1).is_none());
    }

    #[test]
    fn test_debit_reduces_balance() {
        let pool = make_pool(10);
        pool.debit(0, 250.0);
        assert_eq!(pool.balance(0), 750.0);
    }

    #[test]
    fn test_serialized_acquisition_across_threads() {
        use std::sync::Arc;

        let pool = Arc::new(AccountPool::new(
            vec![make_profile("acc1", true, 4, 0.0)],
            100,
            true,
            1000.0,
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.try_acquire(0))
            })
            .collect();

        let acquired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        // The per-account cap can never be exceeded, no matter the race.
        assert_eq!(acquired, 4);
        assert_eq!(pool.global_in_flight(), 4);
    }
}
