//! Bet-order dispatch.
//!
//! Assigns queued orders to eligible accounts. State machine per order:
//! `Queued → Assigning → (Placed | Requeued | Dropped)`. Each pass
//! scans accounts in a fixed order; the chosen account's in-flight
//! counter is reserved before execution and released unconditionally
//! afterwards. An authentication failure earns exactly one session
//! renewal and one retry on the same account before the pass moves on.
//! Capacity shortfalls requeue with a delay instead of failing.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::book::{BetReceipt, BetRequest, Bookmaker, ExecError};
use crate::engine::pool::{AccountId, AccountPool};
use crate::pricing::stake::{kelly_fraction, StakeSizer};
use crate::types::BetOrder;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an order went back on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    /// Global in-flight cap already met or exceeded.
    GlobalCapReached,
    /// Every account was inactive, saturated, under floor, or failed.
    NoEligibleAccount,
}

/// Why an order terminated without a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The underlying match kicked off while the order waited.
    MatchStarted,
    /// Kelly went non-positive; the edge no longer justifies a bet.
    NoEdge,
}

/// Terminal result of one dispatch pass.
#[derive(Debug)]
pub enum DispatchOutcome {
    Placed {
        account: String,
        stake: f64,
        receipt: BetReceipt,
    },
    Requeued {
        reason: RequeueReason,
        delay: Duration,
    },
    Dropped {
        reason: DropReason,
    },
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    book: Arc<dyn Bookmaker>,
    pool: Arc<AccountPool>,
    sizer: StakeSizer,
    global_cap_delay: Duration,
    no_account_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        book: Arc<dyn Bookmaker>,
        pool: Arc<AccountPool>,
        sizer: StakeSizer,
        global_cap_delay: Duration,
        no_account_delay: Duration,
    ) -> Self {
        Self {
            book,
            pool,
            sizer,
            global_cap_delay,
            no_account_delay,
        }
    }

    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    /// Run one assignment pass for an order.
    pub async fn dispatch(&self, order: &BetOrder) -> DispatchOutcome {
        let now = Utc::now();
        if order.alert.has_started(now) {
            info!(order_id = %order.id, alert = %order.alert, "Match started — dropping order");
            return DispatchOutcome::Dropped {
                reason: DropReason::MatchStarted,
            };
        }

        // Advisory pre-check before touching any account.
        if self.pool.at_global_cap() {
            info!(
                order_id = %order.id,
                cap = self.pool.global_cap(),
                "Global concurrency cap reached — requeueing"
            );
            return DispatchOutcome::Requeued {
                reason: RequeueReason::GlobalCapReached,
                delay: self.global_cap_delay,
            };
        }

        let win_prob = order.win_probability();
        if kelly_fraction(order.quote.odds, win_prob) <= 0.0 {
            info!(order_id = %order.id, odds = order.quote.odds, "Edge gone — dropping order");
            return DispatchOutcome::Dropped {
                reason: DropReason::NoEdge,
            };
        }

        for id in 0..self.pool.len() {
            if !self.pool.try_acquire(id) {
                continue;
            }

            // Stake depends on THIS account's bankroll, so sizing waits
            // until assignment rather than happening once per alert.
            let bankroll = self.pool.balance(id);
            let Some(sized) = self.sizer.size(order.quote.odds, win_prob, bankroll) else {
                self.pool.release(id);
                debug!(
                    order_id = %order.id,
                    account = %self.pool.profile(id).username,
                    bankroll,
                    "No stake for this account"
                );
                continue;
            };

            let request = BetRequest {
                event_id: order.book_event_id.clone(),
                outcome_id: order.quote.outcome_id.clone(),
                odds: order.quote.odds,
                stake: sized.stake,
            };

            let result = self.attempt_on_account(id, &request).await;
            self.pool.release(id);

            match result {
                Ok(receipt) => {
                    let account = self.pool.profile(id).username.clone();
                    self.pool.debit(id, sized.stake);
                    info!(
                        order_id = %order.id,
                        account = %account,
                        stake = sized.stake,
                        odds = order.quote.odds,
                        ev = format!("{:.2}%", order.ev_pct),
                        bet_id = %receipt.bet_id,
                        "Bet placed"
                    );
                    return DispatchOutcome::Placed {
                        account,
                        stake: sized.stake,
                        receipt,
                    };
                }
                Err(error) => {
                    warn!(
                        order_id = %order.id,
                        account = %self.pool.profile(id).username,
                        error = %error,
                        "Execution failed on account — trying next"
                    );
                }
            }
        }

        info!(order_id = %order.id, "No eligible account — requeueing");
        DispatchOutcome::Requeued {
            reason: RequeueReason::NoEligibleAccount,
            delay: self.no_account_delay,
        }
    }

    /// Execute against one account, with a single renew-and-retry on
    /// authentication failure. The retry bound lives here, not in the
    /// call graph, so there is no recursion to run away.
    async fn attempt_on_account(
        &self,
        id: AccountId,
        request: &BetRequest,
    ) -> Result<BetReceipt, ExecError> {
        let profile = self.pool.profile(id);
        let session = self.pool.session(id);

        match self.book.execute_bet(profile, session, request).await {
            Err(error) if error.is_auth_failure() => {
                info!(account = %profile.username, "Session expired — renewing once");
                let fresh = self.book.renew_session(profile).await?;
                self.pool.install_session(id, fresh.clone());
                self.book.execute_bet(profile, Some(fresh), request).await
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
