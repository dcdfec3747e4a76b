use crate::models::{UserAccount, UserId};
use std::future::Future;

/// A stars debit that could not be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StarsDebitFailure {
    /// The user's balance is below the requested amount
    InsufficientBalance,
}

/// A gift debit that could not be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GiftDebitFailure {
    /// The user owns fewer of the gift than requested
    InsufficientGifts,
}

/// Repository interface for user accounts and their gift holdings.
///
/// Balance mutations here are raw: the callers pair every debit/credit with
/// a ledger write keyed by a deterministic op id, and serialize per-user
/// access through the user mutex. The repository only enforces the
/// never-negative floor.
pub trait UserRepository: super::Repository {
    /// Create the user if it does not exist yet (users are created on first
    /// reference and never deleted).
    fn ensure_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Fetch a user account with its gift holdings.
    fn get_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send;

    /// Add stars to a user's balance.
    fn credit_stars(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Remove stars from a user's balance, failing if it would go negative.
    fn debit_stars(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> impl Future<Output = Result<Result<(), StarsDebitFailure>, Self::Error>> + Send;

    /// Add gifts to a user's holding of `gift_name`.
    fn credit_gifts(
        &self,
        user_id: UserId,
        gift_name: &str,
        count: i64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Remove gifts from a user's holding, failing if it would go negative.
    fn debit_gifts(
        &self,
        user_id: UserId,
        gift_name: &str,
        count: i64,
    ) -> impl Future<Output = Result<Result<(), GiftDebitFailure>, Self::Error>> + Send;
}
