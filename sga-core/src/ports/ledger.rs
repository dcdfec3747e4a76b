use crate::models::{AuctionId, TransactionRecord, TransactionStatus, UserId};
use std::future::Future;

/// Repository interface for the transaction ledger.
///
/// The ledger is append-mostly: rows are inserted by deterministic op id
/// and the only in-place mutation is the ACTIVE → WON/LOST transition at
/// settlement. It is the source of truth for locked balances.
pub trait LedgerRepository: super::Repository {
    /// Insert a record keyed by its op id; a replay of an existing op id is
    /// a no-op. Returns whether a row was actually written.
    fn upsert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// The user's locked total: the sum, grouped by auction, of the latest
    /// ACTIVE BET / BET_INCREASE amount. Increases supersede their
    /// predecessors, so this is not a plain sum over rows.
    fn locked_amount(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<i64, Self::Error>> + Send;

    /// Transition every ACTIVE BET / BET_INCREASE record of `user_id` in
    /// `auction_id` to `status`. Returns the number of rows changed.
    fn settle_bid_records(
        &self,
        auction_id: AuctionId,
        user_id: UserId,
        status: TransactionStatus,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// The user's ledger records, newest first.
    fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TransactionRecord>, Self::Error>> + Send;
}
