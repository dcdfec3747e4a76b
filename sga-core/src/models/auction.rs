use super::{AuctionId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Sentinel stored in `current_round` while a round is being settled.
///
/// This value never leaves the core: user-visible representations report the
/// auction state instead. Before the first round starts, `current_round` is
/// `-1`.
pub const SETTLING_ROUND: i64 = -2;

/// Lifecycle state of an auction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionState {
    /// Created, waiting for `start_time`
    Pending,
    /// A round is open for bids
    Active,
    /// A round is being settled; bids are rejected
    Settling,
    /// All rounds settled
    Finished,
    /// Cancelled before completion
    Cancelled,
}

impl AuctionState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl std::fmt::Display for AuctionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Settling => "SETTLING",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AuctionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "SETTLING" => Ok(Self::Settling),
            "FINISHED" => Ok(Self::Finished),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown auction state: {other}")),
        }
    }
}

/// One time-boxed phase of an auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Round {
    /// How long the round stays open, in seconds
    pub duration_secs: i64,
    /// Prize vector: `prizes[p-1]` gifts go to the bidder at place `p`
    pub prizes: Vec<i64>,
}

impl Round {
    /// Sum of the round's prize slots.
    pub fn total_prizes(&self) -> i64 {
        self.prizes.iter().sum()
    }
}

/// An append-only settlement record: who won which place of which round.
///
/// `place` 0 is reserved for the author-refund record written when a round
/// closes with no bidders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Winner {
    /// Which round produced this record
    pub round: i64,
    /// 1-based place in the round's ranking; 0 for the no-bid author refund
    pub place: i64,
    /// The winning user (the author, for place 0)
    pub user_id: UserId,
    /// Stars consumed from the winner (0 for place 0)
    pub stars: i64,
    /// Gifts credited
    pub prize: i64,
}

/// An auction document as stored in the durable store.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Auction {
    /// Stable auction id
    pub auction_id: AuctionId,
    /// Human-readable name
    pub name: String,
    /// Lifecycle state
    pub state: AuctionState,
    /// Index of the running round; -1 before start, [`SETTLING_ROUND`] while settling
    pub current_round: i64,
    /// Absolute deadline of the running round
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>)]
    pub round_end_time: Option<OffsetDateTime>,
    /// Name of the prize gift
    pub gift_name: String,
    /// Gifts transferred from the author at creation
    pub gift_count: i64,
    /// When the first round opens
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub start_time: OffsetDateTime,
    /// The user who created the auction (cannot bid on it)
    pub author_id: UserId,
    /// Ordered round definitions
    pub rounds: Vec<Round>,
    /// Append-only settlement records
    pub winners: Vec<Winner>,
    /// Creation timestamp
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub created_at: OffsetDateTime,
}

impl Auction {
    /// Whether the auction currently admits bids.
    ///
    /// The settling sentinel in `current_round` blocks admission even if the
    /// state column has not caught up yet.
    pub fn is_open_for_bids(&self) -> bool {
        self.state == AuctionState::Active && self.current_round >= 0
    }

    /// The definition of round `index`, if it exists.
    pub fn round(&self, index: i64) -> Option<&Round> {
        usize::try_from(index).ok().and_then(|i| self.rounds.get(i))
    }

    /// Total gifts the author committed across all rounds.
    pub fn total_prizes(&self) -> i64 {
        self.rounds.iter().map(Round::total_prizes).sum()
    }

    /// Winner records already appended for round `index`.
    pub fn winners_of_round(&self, index: i64) -> impl Iterator<Item = &Winner> {
        self.winners.iter().filter(move |w| w.round == index)
    }
}

/// Validation failures for [`RawAuctionDto`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CreateAuctionError {
    /// Name empty or longer than 120 characters
    #[error("invalid auction name")]
    InvalidName,
    /// Gift name empty, or gift count not positive
    #[error("invalid prize gift")]
    InvalidGift,
    /// Start time missing or unparseable
    #[error("invalid start time")]
    InvalidStartTime,
    /// No rounds, non-positive duration, or an empty/non-positive prize vector
    #[error("invalid rounds")]
    InvalidRounds,
    /// The committed gift count does not equal the sum of the prize vectors
    #[error("committed gift count must equal the sum of the prize vectors")]
    PrizeMismatch,
}

/// Raw creation request for an auction, as accepted by the API.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RawAuctionDto {
    /// Human-readable name
    pub name: String,
    /// Name of the prize gift
    pub gift_name: String,
    /// Gifts to transfer from the author into the auction
    pub gift_count: i64,
    /// When the first round opens, epoch milliseconds
    pub start_time: i64,
    /// Ordered round definitions
    pub rounds: Vec<RawRoundDto>,
}

/// Raw round definition inside [`RawAuctionDto`].
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RawRoundDto {
    /// Round duration in seconds
    pub duration: i64,
    /// Prize vector, one positive entry per place
    pub prizes: Vec<i64>,
}

impl RawAuctionDto {
    /// Validate the request and build the auction document.
    ///
    /// The committed `gift_count` must equal the sum of every round's prize
    /// vector, so the gifts outstanding for the auction always match the
    /// unclaimed prizes.
    pub fn into_auction(
        self,
        auction_id: AuctionId,
        author_id: UserId,
        now: OffsetDateTime,
    ) -> Result<Auction, CreateAuctionError> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > 120 {
            return Err(CreateAuctionError::InvalidName);
        }
        if self.gift_name.trim().is_empty() || self.gift_count <= 0 {
            return Err(CreateAuctionError::InvalidGift);
        }
        let start_time = OffsetDateTime::from_unix_timestamp_nanos(self.start_time as i128 * 1_000_000)
            .map_err(|_| CreateAuctionError::InvalidStartTime)?;
        if self.rounds.is_empty() {
            return Err(CreateAuctionError::InvalidRounds);
        }
        let mut rounds = Vec::with_capacity(self.rounds.len());
        for raw in self.rounds {
            if raw.duration <= 0 || raw.prizes.is_empty() || raw.prizes.iter().any(|p| *p <= 0) {
                return Err(CreateAuctionError::InvalidRounds);
            }
            rounds.push(Round {
                duration_secs: raw.duration,
                prizes: raw.prizes,
            });
        }
        let committed: i64 = rounds.iter().map(Round::total_prizes).sum();
        if committed != self.gift_count {
            return Err(CreateAuctionError::PrizeMismatch);
        }

        Ok(Auction {
            auction_id,
            name: name.to_owned(),
            state: AuctionState::Pending,
            current_round: -1,
            round_end_time: None,
            gift_name: self.gift_name.trim().to_owned(),
            gift_count: self.gift_count,
            start_time,
            author_id,
            rounds,
            winners: Vec::new(),
            created_at: now,
        })
    }
}
