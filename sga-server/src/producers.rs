//! Snapshot producers feeding the subscription streams.
//!
//! One long-lived task composes the all-auctions snapshot every second. Per
//! auction, a reference-counted producer ticks twice a second while anyone
//! is subscribed, publishes a final snapshot when the auction reaches a
//! terminal state, and retires after a short grace period once the last
//! subscriber leaves.

use crate::AppState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fxhash::FxBuildHasher;
use sga_core::models::{AuctionId, AuctionListing, AuctionSnapshot, AuctionsSnapshot, BidRow};
use sga_core::ports::AuctionStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::{Notify, watch};
use tracing::{Level, event};

const ALL_AUCTIONS_TICK: Duration = Duration::from_millis(1000);
const PER_AUCTION_TICK: Duration = Duration::from_millis(500);
/// How long a producer lingers after its last subscriber leaves, and how
/// long a terminal snapshot stays deliverable before the producer retires.
const GRACE: Duration = Duration::from_secs(5);
const TOP_BIDS_IN_SNAPSHOT: usize = 10;

struct ProducerEntry {
    refs: usize,
    nudge: Arc<Notify>,
}

/// Registry of live per-auction producers.
#[derive(Default)]
pub struct ProducerManager {
    entries: DashMap<AuctionId, ProducerEntry, FxBuildHasher>,
}

impl ProducerManager {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Keeps a producer's reference count while a subscriber stream is alive.
pub struct SubscriberGuard {
    manager: Arc<ProducerManager>,
    nudge: Arc<Notify>,
    auction_id: AuctionId,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.manager.entries.get_mut(&self.auction_id) {
            entry.refs = entry.refs.saturating_sub(1);
        }
        // Wake the producer so it can start its idle countdown.
        self.nudge.notify_one();
    }
}

/// Subscribe to an auction's snapshot channel, starting its producer if
/// this is the first subscriber.
pub fn subscribe<T: AuctionStore>(
    state: &AppState<T>,
    auction_id: AuctionId,
) -> (watch::Receiver<Option<String>>, SubscriberGuard) {
    let receiver = state.hub.subscribe_auction(auction_id);
    let nudge = register(state, auction_id, 1);
    (
        receiver,
        SubscriberGuard {
            manager: state.producers.clone(),
            nudge,
            auction_id,
        },
    )
}

/// Nudge the auction's producer to publish immediately, starting it if it
/// was idle. Called after every admitted bid and every settlement step.
pub fn notify_auction_update<T: AuctionStore>(state: &AppState<T>, auction_id: AuctionId) {
    let nudge = register(state, auction_id, 0);
    nudge.notify_one();
}

fn register<T: AuctionStore>(
    state: &AppState<T>,
    auction_id: AuctionId,
    initial_refs: usize,
) -> Arc<Notify> {
    match state.producers.entries.entry(auction_id) {
        Entry::Occupied(mut entry) => {
            entry.get_mut().refs += initial_refs;
            entry.get().nudge.clone()
        }
        Entry::Vacant(entry) => {
            let nudge = Arc::new(Notify::new());
            entry.insert(ProducerEntry {
                refs: initial_refs,
                nudge: nudge.clone(),
            });
            spawn_auction_producer(state.clone(), auction_id, nudge.clone());
            nudge
        }
    }
}

fn spawn_auction_producer<T: AuctionStore>(
    state: AppState<T>,
    auction_id: AuctionId,
    nudge: Arc<Notify>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PER_AUCTION_TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut idle_since: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = nudge.notified() => {}
            }

            let auction = match state.store.get_auction(auction_id).await {
                Ok(Some(auction)) => auction,
                Ok(None) => break,
                Err(error) => {
                    event!(Level::WARN, %error, %auction_id, "snapshot read failed");
                    continue;
                }
            };

            let top_bids = state
                .board
                .top_bidders(auction_id, TOP_BIDS_IN_SNAPSHOT)
                .into_iter()
                .enumerate()
                .map(|(i, (user_id, amount))| BidRow {
                    place: i as i64 + 1,
                    user_id,
                    amount,
                })
                .collect();
            let snapshot = AuctionSnapshot::compose(
                OffsetDateTime::now_utc(),
                &auction,
                state.board.participants(auction_id),
                top_bids,
            );
            match serde_json::to_string(&snapshot) {
                Ok(payload) => state.hub.publish_auction(auction_id, payload),
                Err(error) => event!(Level::ERROR, %error, "snapshot serialization failed"),
            }

            if auction.state.is_terminal() {
                // Clients get a grace window to receive the final snapshot.
                tokio::time::sleep(GRACE).await;
                break;
            }

            let refs = state
                .producers
                .entries
                .get(&auction_id)
                .map(|entry| entry.refs)
                .unwrap_or(0);
            if refs == 0 {
                match idle_since {
                    None => idle_since = Some(Instant::now()),
                    Some(since) if since.elapsed() >= GRACE => {
                        // Late subscribers may have raced the countdown;
                        // only retire if the count is still zero.
                        let removed = state
                            .producers
                            .entries
                            .remove_if(&auction_id, |_, entry| entry.refs == 0);
                        if removed.is_some() {
                            state.hub.drop_auction(auction_id);
                            return;
                        }
                        idle_since = None;
                    }
                    Some(_) => {}
                }
            } else {
                idle_since = None;
            }
        }

        state.producers.entries.remove(&auction_id);
        state.hub.drop_auction(auction_id);
    });
}

/// Spawn the all-auctions snapshot producer; runs for the process lifetime.
pub fn spawn_all_auctions_producer<T: AuctionStore>(
    state: AppState<T>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ALL_AUCTIONS_TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let auctions = match state.store.list_open_auctions().await {
                Ok(auctions) => auctions,
                Err(error) => {
                    event!(Level::WARN, %error, "auction listing failed");
                    continue;
                }
            };
            let listings = auctions
                .iter()
                .map(|auction| AuctionListing {
                    auction: auction.into(),
                    participants: state.board.participants(auction.auction_id),
                })
                .collect();
            let snapshot = AuctionsSnapshot::compose(OffsetDateTime::now_utc(), listings);
            match serde_json::to_string(&snapshot) {
                Ok(payload) => state.hub.publish_all(payload),
                Err(error) => event!(Level::ERROR, %error, "snapshot serialization failed"),
            }
        }
    })
}
