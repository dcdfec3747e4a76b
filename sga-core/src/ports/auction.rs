use crate::models::{Auction, AuctionId, Winner};
use std::future::Future;
use time::OffsetDateTime;

/// Repository interface for auction documents.
///
/// Every state transition is a conditional update: the predicate names the
/// exact state it expects and the method reports whether the row matched.
/// Duplicate scheduler fires are defeated by those predicates, not by any
/// singleton-worker assumption.
pub trait AuctionRepository: super::Repository {
    /// Insert a new auction document.
    ///
    /// Returns `Ok(false)` on an id conflict (the document is left as-is).
    fn create_auction(
        &self,
        auction: &Auction,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Delete an auction document. Compensation path for a failed create;
    /// settled auctions are never deleted.
    fn delete_auction(
        &self,
        auction_id: AuctionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Fetch an auction with its winner records.
    fn get_auction(
        &self,
        auction_id: AuctionId,
    ) -> impl Future<Output = Result<Option<Auction>, Self::Error>> + Send;

    /// All auctions in PENDING or ACTIVE state, ordered by start time.
    fn list_open_auctions(
        &self,
    ) -> impl Future<Output = Result<Vec<Auction>, Self::Error>> + Send;

    /// `PENDING → ACTIVE(round)` with the given deadline.
    ///
    /// Returns whether the conditional update matched.
    fn start_auction(
        &self,
        auction_id: AuctionId,
        round: i64,
        round_end_time: OffsetDateTime,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// `(ACTIVE ∧ current_round = round) ∨ already-settling → SETTLING`.
    ///
    /// Returns `Ok(true)` when the caller holds the settlement (first fire
    /// or a retry of an interrupted one), `Ok(false)` when the event is a
    /// stale duplicate to be dropped.
    fn mark_settling(
        &self,
        auction_id: AuctionId,
        round: i64,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Append the winner records for a settled round.
    ///
    /// Guarded: the append is a no-op (returning `Ok(false)`) when the round
    /// already has winner records, so a retried settlement never duplicates.
    fn append_winners(
        &self,
        auction_id: AuctionId,
        round: i64,
        winners: &[Winner],
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// `SETTLING → ACTIVE(next_round)` with the given deadline.
    fn advance_round(
        &self,
        auction_id: AuctionId,
        next_round: i64,
        round_end_time: OffsetDateTime,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// `SETTLING → FINISHED`; clears the round deadline.
    fn finish_auction(
        &self,
        auction_id: AuctionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Overwrite the running round's deadline (anti-snipe extension).
    fn set_round_end_time(
        &self,
        auction_id: AuctionId,
        round_end_time: OffsetDateTime,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
