//! Decision engine — alert intake through bet dispatch.
//!
//! `BetEngine` composes the pipeline: dedup → market resolution →
//! devig → EV gate → order creation → queued (or immediate) dispatch.
//! A single long-lived worker task drains the order queue; the
//! ingestion path and the worker meet only at that queue.

pub mod dedup;
pub mod dispatcher;
pub mod pool;
pub mod queue;
pub mod resolver;

use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::book::Bookmaker;
use crate::config::{AppConfig, BetSettings, EngineConfig};
use crate::engine::dedup::{AlertDeduplicator, DedupDecision};
use crate::engine::dispatcher::{DispatchOutcome, Dispatcher};
use crate::engine::pool::AccountPool;
use crate::engine::queue::OrderQueue;
use crate::feed::OddsFeed;
use crate::pricing::devig::{devig, FairPrices};
use crate::pricing::ev::calculate_ev;
use crate::pricing::stake::{StakeConfig, StakeSizer};
use crate::types::{Alert, BetOrder, EngineError};

/// Sleep bound for an idle worker between queue polls; pushes wake it
/// sooner via the queue's notifier.
const IDLE_POLL: std::time::Duration = std::time::Duration::from_millis(500);

impl std::fmt::Debug for BetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BetEngine")
            .field("settings", &self.settings)
            .field("immediate_dispatch", &self.immediate_dispatch)
            .finish_non_exhaustive()
    }
}

pub struct BetEngine {
    book: Arc<dyn Bookmaker>,
    feed: Option<Arc<dyn OddsFeed>>,
    pool: Arc<AccountPool>,
    queue: Arc<OrderQueue>,
    dedup: AlertDeduplicator,
    dispatcher: Dispatcher,
    settings: BetSettings,
    immediate_dispatch: bool,
    shutdown: AtomicBool,
}

impl BetEngine {
    /// Build the engine from a validated configuration and the two
    /// external collaborators. Fails only on startup-fatal config.
    pub fn new(
        config: &AppConfig,
        book: Arc<dyn Bookmaker>,
        feed: Option<Arc<dyn OddsFeed>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let EngineConfig {
            max_total_concurrent_bets,
            immediate_dispatch,
            global_cap_delay_secs,
            no_account_delay_secs,
            dedup_capacity,
            stale_after_secs,
            track_balances,
        } = config.engine.clone();

        let pool = Arc::new(AccountPool::new(
            config.accounts.clone(),
            max_total_concurrent_bets,
            track_balances,
            config.bet_settings.bankroll,
        ));

        let sizer = StakeSizer::new(StakeConfig {
            kelly_fraction: config.bet_settings.kelly_fraction,
            min_stake: config.bet_settings.min_stake,
            max_stake: config.bet_settings.max_stake,
            odds_tiers: config.bet_settings.odds_tiers.clone(),
        });

        let dispatcher = Dispatcher::new(
            Arc::clone(&book),
            Arc::clone(&pool),
            sizer,
            Duration::seconds(global_cap_delay_secs as i64),
            Duration::seconds(no_account_delay_secs as i64),
        );

        Ok(Self {
            book,
            feed,
            pool,
            queue: Arc::new(OrderQueue::new()),
            dedup: AlertDeduplicator::new(dedup_capacity, Duration::seconds(stale_after_secs as i64)),
            dispatcher,
            settings: config.bet_settings.clone(),
            immediate_dispatch,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Run one alert through the full decision pipeline. Returns true
    /// when a bet order was queued (or, in immediate mode, placed or
    /// scheduled for retry). Every failure drops this alert only.
    pub async fn notify(&self, alert: Alert) -> bool {
        if let Err(e) = alert.validate() {
            warn!(alert_id = %alert.id, error = %e, "Rejecting malformed alert");
            return false;
        }

        match self.dedup.process(&alert) {
            DedupDecision::Pass => {}
            DedupDecision::Duplicate => {
                debug!(alert = %alert, "Duplicate alert ignored");
                return false;
            }
            DedupDecision::Stale => {
                debug!(alert = %alert, "Stale alert ignored");
                return false;
            }
        }

        // Locate the fixture on the bookmaker.
        let book_event_id = match self
            .book
            .search_event(&alert.home, &alert.away, Some(alert.starts))
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!(alert = %alert, book = self.book.name(), "Event not listed on bookmaker");
                return false;
            }
            Err(e) => {
                warn!(alert = %alert, error = %e, "Event search failed");
                return false;
            }
        };

        let catalog = match self.book.event_catalog(&book_event_id).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(alert = %alert, error = %e, "Catalog fetch failed");
                return false;
            }
        };

        let selection = resolver::BetSelection::from(&alert);
        let quote = match resolver::resolve(&selection, &catalog) {
            Ok(quote) => quote,
            Err(e) => {
                info!(alert = %alert, error = %e, "Market unresolved");
                return false;
            }
        };

        if quote.odds > self.settings.max_book_odds {
            info!(
                alert = %alert,
                odds = quote.odds,
                ceiling = self.settings.max_book_odds,
                "Bookmaker odds above ceiling"
            );
            return false;
        }

        let fair = self.fair_prices(&alert).await;
        let fair_price = fair.price(self.settings.devig_method, alert.outcome);
        let ev = calculate_ev(quote.odds, fair_price);

        if ev < self.settings.min_ev {
            info!(
                alert = %alert,
                ev = format!("{ev:.2}%"),
                min_ev = format!("{:.2}%", self.settings.min_ev),
                "EV below threshold"
            );
            return false;
        }

        // fair_price is present here: a missing price scores the -100
        // sentinel and never clears the threshold.
        let Some(fair_price) = fair_price else {
            return false;
        };

        let order = BetOrder::new(alert, quote, book_event_id, fair_price, ev);
        info!(
            order_id = %order.id,
            alert = %order.alert,
            odds = order.quote.odds,
            fair = format!("{fair_price:.3}"),
            ev = format!("{ev:.2}%"),
            "Positive-EV order created"
        );

        if self.immediate_dispatch {
            match self.dispatcher.dispatch(&order).await {
                DispatchOutcome::Placed { .. } => true,
                DispatchOutcome::Requeued { delay, .. } => {
                    self.queue.push_delayed(order, delay);
                    true
                }
                DispatchOutcome::Dropped { .. } => false,
            }
        } else {
            self.queue.push(order);
            true
        }
    }

    /// Reference prices for the alert's outcome set: live feed prices
    /// are preferred per-field, the alert's snapshot fills the gaps.
    async fn fair_prices(&self, alert: &Alert) -> FairPrices {
        let mut prices = alert.prices.clone();

        if let Some(feed) = &self.feed {
            match feed
                .live_prices(&alert.event_id, alert.line_type, alert.points, alert.half)
                .await
            {
                Ok(Some(live)) => {
                    debug!(alert = %alert, outcomes = live.len(), "Using live reference prices");
                    for (outcome, price) in live {
                        prices.insert(outcome, price);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(alert = %alert, error = %e, "Live price refresh failed — using snapshot");
                }
            }
        }

        devig(&prices)
    }

    // -- Worker -----------------------------------------------------------

    /// Spawn the long-lived queue worker.
    pub fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.worker_loop().await })
    }

    /// Ask the worker to stop after its current order.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.queue.wake();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drain all pending orders without executing them.
    pub fn clear_queue(&self) -> usize {
        let drained = self.queue.clear();
        info!(drained, "Order queue cleared");
        drained
    }

    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    async fn worker_loop(&self) {
        info!("Dispatch worker started");
        while !self.shutdown.load(Ordering::Relaxed) {
            let now = chrono::Utc::now();
            if let Some(mut order) = self.queue.pop_ready(now) {
                order.attempts += 1;
                let attempts = order.attempts;
                match self.dispatcher.dispatch(&order).await {
                    DispatchOutcome::Placed { account, stake, .. } => {
                        info!(
                            order_id = %order.id,
                            account = %account,
                            stake,
                            attempts,
                            "Order placed"
                        );
                    }
                    DispatchOutcome::Requeued { reason, delay } => {
                        debug!(
                            order_id = %order.id,
                            reason = ?reason,
                            delay_secs = delay.num_seconds(),
                            attempts,
                            "Order requeued"
                        );
                        self.queue.push_delayed(order, delay);
                    }
                    DispatchOutcome::Dropped { reason } => {
                        info!(order_id = %order.id, reason = ?reason, attempts, "Order dropped");
                    }
                }
                continue;
            }

            let sleep_for = match self.queue.next_ready_at() {
                Some(at) => (at - chrono::Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO)
                    .min(IDLE_POLL),
                None => IDLE_POLL,
            };
            tokio::select! {
                _ = self.queue.changed() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
        info!(pending = self.queue.len(), "Dispatch worker stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
