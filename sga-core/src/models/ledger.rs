use super::{AuctionId, UserId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// What kind of balance movement a ledger record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// First bid of a user in an auction
    Bet,
    /// A raise of an existing bid
    BetIncrease,
    /// Gifts returned to the author (no bidders, or unclaimed slots)
    Refund,
    /// A settlement win: stars consumed, gifts credited
    Win,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bet => "BET",
            Self::BetIncrease => "BET_INCREASE",
            Self::Refund => "REFUND",
            Self::Win => "WIN",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BET" => Ok(Self::Bet),
            "BET_INCREASE" => Ok(Self::BetIncrease),
            "REFUND" => Ok(Self::Refund),
            "WIN" => Ok(Self::Win),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}

/// Settlement status of a ledger record.
///
/// BET / BET_INCREASE records are ACTIVE while their auction runs and
/// transition to WON or LOST exactly once, at settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// The bid is live; its amount counts toward the user's locked total
    Active,
    /// The bid won its round
    Won,
    /// The bid lost; the lock was released
    Lost,
    /// Gifts were returned to the author
    Refunded,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "WON" => Ok(Self::Won),
            "LOST" => Ok(Self::Lost),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// One record of the append-mostly transaction ledger.
///
/// Records are keyed by a deterministic operation id, which is what makes
/// every write safely retryable: replaying an upsert with the same op id is
/// a no-op. The ledger is the authoritative source for a user's locked
/// total; the fast cache never is.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    /// Unique, deterministic operation id
    pub op_id: String,
    /// Movement kind
    pub kind: TransactionKind,
    /// Settlement status
    pub status: TransactionStatus,
    /// The affected user
    pub user_id: UserId,
    /// The auction this movement belongs to
    pub auction_id: AuctionId,
    /// Round index the movement applies to
    pub round: i64,
    /// Current bid (bid path) or prize count (settlement path)
    pub amount: i64,
    /// The superseded bid amount (0 for first bids and settlement records)
    pub previous_amount: i64,
    /// Stars newly locked / consumed by this record
    pub diff: i64,
    /// Creation timestamp
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub created_at: OffsetDateTime,
}

impl TransactionRecord {
    /// The record written for an admitted bid.
    ///
    /// Keyed by the request's idempotency key so a crashed-and-retried
    /// admission upserts the same row.
    pub fn bet(
        op_id: String,
        user_id: UserId,
        auction_id: AuctionId,
        round: i64,
        amount: i64,
        previous_amount: i64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            op_id,
            kind: if previous_amount == 0 {
                TransactionKind::Bet
            } else {
                TransactionKind::BetIncrease
            },
            status: TransactionStatus::Active,
            user_id,
            auction_id,
            round,
            amount,
            previous_amount,
            diff: amount - previous_amount,
            created_at: now,
        }
    }

    /// The record written when a winner is settled.
    pub fn win(
        auction_id: AuctionId,
        user_id: UserId,
        round: i64,
        place: i64,
        stars: i64,
        prize: i64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            op_id: win_op_id(auction_id, user_id, round, place),
            kind: TransactionKind::Win,
            status: TransactionStatus::Won,
            user_id,
            auction_id,
            round,
            amount: prize,
            previous_amount: 0,
            diff: stars,
            created_at: now,
        }
    }

    /// The record written when prizes return to the author.
    pub fn refund(
        op_id: String,
        auction_id: AuctionId,
        author_id: UserId,
        round: i64,
        prize: i64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            op_id,
            kind: TransactionKind::Refund,
            status: TransactionStatus::Refunded,
            user_id: author_id,
            auction_id,
            round,
            amount: prize,
            previous_amount: 0,
            diff: 0,
            created_at: now,
        }
    }
}

/// Op id for a settlement win: `{auction}:{user}:win:{round}:place{place}`.
pub fn win_op_id(auction_id: AuctionId, user_id: UserId, round: i64, place: i64) -> String {
    format!("{auction_id}:{user_id}:win:{round}:place{place}")
}

/// Op id for the author refund of a round nobody bid on.
pub fn no_bid_refund_op_id(auction_id: AuctionId, author_id: UserId, round: i64) -> String {
    format!("{auction_id}:{author_id}:win:{round}:place-0-refund")
}

/// Op id for the author refund of unclaimed prize slots.
pub fn unclaimed_op_id(auction_id: AuctionId, author_id: UserId, round: i64) -> String {
    format!("{auction_id}:{author_id}:unclaimed:{round}")
}
