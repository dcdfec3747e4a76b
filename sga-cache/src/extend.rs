use dashmap::DashMap;
use fxhash::FxBuildHasher;
use sga_core::models::AuctionId;
use std::time::{Duration, Instant};

struct Counter {
    used: u32,
    expires_at: Instant,
}

/// Anti-snipe extension counters, keyed by (auction, round).
///
/// Kept in the fast store rather than in the round processor's memory so
/// that every server observes the same per-round budget. Entries carry a
/// TTL sized to the round so finished rounds cost nothing.
#[derive(Default)]
pub struct ExtensionCounters {
    counters: DashMap<(AuctionId, i64), Counter, FxBuildHasher>,
}

impl ExtensionCounters {
    /// An empty counter table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one extension of the round's budget of `max`.
    ///
    /// Returns false when the budget is exhausted.
    pub fn try_claim(&self, auction_id: AuctionId, round: i64, max: u32, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut counter = self
            .counters
            .entry((auction_id, round))
            .or_insert_with(|| Counter {
                used: 0,
                expires_at: now + ttl,
            });
        if counter.expires_at <= now {
            counter.used = 0;
            counter.expires_at = now + ttl;
        }
        if counter.used >= max {
            return false;
        }
        counter.used += 1;
        true
    }

    /// Forget a settled round's counter.
    pub fn clear_round(&self, auction_id: AuctionId, round: i64) {
        self.counters.remove(&(auction_id, round));
    }
}
