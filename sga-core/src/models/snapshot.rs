use super::{Auction, AuctionId, AuctionState, UserId, Winner};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// One row of an auction's ranked bid list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BidRow {
    /// 1-based place in the ranking
    pub place: i64,
    /// The bidder
    pub user_id: UserId,
    /// The bidder's current bid
    pub amount: i64,
}

/// The user-visible projection of an auction document.
///
/// The settling sentinel never appears here: `current_round` is reported
/// only while a round is actually running, and the state carries the rest.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuctionSummary {
    /// Auction id
    pub auction_id: AuctionId,
    /// Human-readable name
    pub name: String,
    /// Lifecycle state
    pub state: AuctionState,
    /// Index of the running round, if one is open
    pub current_round: Option<u32>,
    /// Deadline of the running round, epoch milliseconds
    pub round_end_time: Option<i64>,
    /// Prize gift name
    pub gift_name: String,
    /// Total gifts committed to the auction
    pub gift_count: i64,
    /// When the first round opens, epoch milliseconds
    pub start_time: i64,
    /// The auction's author
    pub author_id: UserId,
    /// Number of configured rounds
    pub total_rounds: u32,
    /// Settlement records so far
    pub winners: Vec<Winner>,
}

fn epoch_ms(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

impl From<&Auction> for AuctionSummary {
    fn from(auction: &Auction) -> Self {
        Self {
            auction_id: auction.auction_id,
            name: auction.name.clone(),
            state: auction.state,
            current_round: u32::try_from(auction.current_round).ok(),
            round_end_time: auction.round_end_time.map(epoch_ms),
            gift_name: auction.gift_name.clone(),
            gift_count: auction.gift_count,
            start_time: epoch_ms(auction.start_time),
            author_id: auction.author_id,
            total_rounds: auction.rounds.len() as u32,
            winners: auction.winners.clone(),
        }
    }
}

/// Periodic snapshot for the all-auctions stream.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuctionsSnapshot {
    /// Snapshot timestamp, epoch milliseconds
    pub ts: i64,
    /// Every listed auction with its live participant count
    pub auctions: Vec<AuctionListing>,
}

/// One entry of [`AuctionsSnapshot`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuctionListing {
    /// The auction
    #[serde(flatten)]
    pub auction: AuctionSummary,
    /// Live bidder count
    pub participants: u64,
}

/// Periodic snapshot for a single-auction stream.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuctionSnapshot {
    /// Snapshot timestamp, epoch milliseconds
    pub ts: i64,
    /// The auction
    pub auction: AuctionSummary,
    /// Live bidder count
    pub participants: u64,
    /// The current top of the ranked set
    pub top_bids: Vec<BidRow>,
}

impl AuctionsSnapshot {
    /// Build the all-auctions snapshot at `now`.
    pub fn compose(now: OffsetDateTime, auctions: Vec<AuctionListing>) -> Self {
        Self {
            ts: epoch_ms(now),
            auctions,
        }
    }
}

impl AuctionSnapshot {
    /// Build a single-auction snapshot at `now`.
    pub fn compose(
        now: OffsetDateTime,
        auction: &Auction,
        participants: u64,
        top_bids: Vec<BidRow>,
    ) -> Self {
        Self {
            ts: epoch_ms(now),
            auction: auction.into(),
            participants,
            top_bids,
        }
    }
}
