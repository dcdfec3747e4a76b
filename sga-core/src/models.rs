mod auction;
mod bid;
mod ids;
mod job;
mod ledger;
mod snapshot;
mod user;

pub use auction::{
    Auction, AuctionState, CreateAuctionError, RawAuctionDto, RawRoundDto, Round, Winner,
    SETTLING_ROUND,
};
pub use bid::{
    BidOutcome, BidPlacement, IdempotencyKey, InvalidIdempotencyKey, StoredOutcome, bid_score,
    score_amount, score_first_bid_ts, MAX_TS,
};
pub use ids::{AuctionId, UserId};
pub use job::{JobKind, JobRecord, end_round_job_id, start_round_job_id};
pub use ledger::{
    TransactionKind, TransactionRecord, TransactionStatus, no_bid_refund_op_id, unclaimed_op_id,
    win_op_id,
};
pub use snapshot::{AuctionListing, AuctionSnapshot, AuctionSummary, AuctionsSnapshot, BidRow};
pub use user::{GiftHolding, UserAccount};
