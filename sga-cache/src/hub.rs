use dashmap::DashMap;
use fxhash::FxBuildHasher;
use sga_core::models::AuctionId;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// How long a published snapshot stays usable as a subscription seed.
const SEED_TTL: Duration = Duration::from_secs(5);

struct Seed {
    payload: String,
    stored_at: Instant,
}

/// The pub/sub side of the fast store: one channel for the all-auctions
/// feed, one channel per auction, and a short-TTL seed of the latest
/// per-auction snapshot so a fresh subscriber gets an immediate first
/// message instead of waiting out a producer tick.
///
/// Payloads are already-serialized JSON snapshots; the HTTP layer wraps
/// them into SSE events.
pub struct UpdateHub {
    all: watch::Sender<Option<String>>,
    channels: DashMap<AuctionId, watch::Sender<Option<String>>, FxBuildHasher>,
    seeds: DashMap<AuctionId, Seed, FxBuildHasher>,
}

impl Default for UpdateHub {
    fn default() -> Self {
        let (all, _) = watch::channel(None);
        Self {
            all,
            channels: DashMap::default(),
            seeds: DashMap::default(),
        }
    }
}

impl UpdateHub {
    /// An empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a snapshot on the all-auctions channel.
    pub fn publish_all(&self, payload: String) {
        let _ = self.all.send_replace(Some(payload));
    }

    /// Subscribe to the all-auctions channel.
    pub fn subscribe_all(&self) -> watch::Receiver<Option<String>> {
        self.all.subscribe()
    }

    /// Publish a snapshot on an auction's channel and refresh its seed.
    pub fn publish_auction(&self, auction_id: AuctionId, payload: String) {
        self.seeds.insert(
            auction_id,
            Seed {
                payload: payload.clone(),
                stored_at: Instant::now(),
            },
        );
        let sender = self.channel(auction_id);
        let _ = sender.send_replace(Some(payload));
    }

    /// Subscribe to an auction's channel, pre-seeded with the latest fresh
    /// snapshot when one exists.
    pub fn subscribe_auction(&self, auction_id: AuctionId) -> watch::Receiver<Option<String>> {
        self.channel(auction_id).subscribe()
    }

    /// Drop an auction's channel and seed once its producer retires.
    pub fn drop_auction(&self, auction_id: AuctionId) {
        self.channels.remove(&auction_id);
        self.seeds.remove(&auction_id);
    }

    fn channel(&self, auction_id: AuctionId) -> watch::Sender<Option<String>> {
        self.channels
            .entry(auction_id)
            .or_insert_with(|| {
                let seed = self.seeds.get(&auction_id).and_then(|seed| {
                    (seed.stored_at.elapsed() < SEED_TTL).then(|| seed.payload.clone())
                });
                let (sender, _) = watch::channel(seed);
                sender
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_the_latest_snapshot() {
        let hub = UpdateHub::new();
        let auction = AuctionId::generate();

        hub.publish_auction(auction, "{\"v\":1}".into());
        hub.publish_auction(auction, "{\"v\":2}".into());

        let receiver = hub.subscribe_auction(auction);
        assert_eq!(receiver.borrow().as_deref(), Some("{\"v\":2}"));
    }

    #[tokio::test]
    async fn fresh_subscription_is_seeded_after_channel_drop() {
        let hub = UpdateHub::new();
        let auction = AuctionId::generate();

        hub.publish_auction(auction, "{\"seed\":true}".into());
        // Simulate the producer retiring while the seed is still fresh.
        hub.channels.remove(&auction);

        let receiver = hub.subscribe_auction(auction);
        assert_eq!(receiver.borrow().as_deref(), Some("{\"seed\":true}"));
    }

    #[tokio::test]
    async fn all_channel_fans_out() {
        let hub = UpdateHub::new();
        let mut receiver = hub.subscribe_all();
        hub.publish_all("{\"auctions\":[]}".into());
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().as_deref(), Some("{\"auctions\":[]}"));
    }
}
