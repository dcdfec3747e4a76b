mod auction;
mod jobs;
mod ledger;
mod user;

pub use auction::AuctionRepository;
pub use jobs::JobStore;
pub use ledger::LedgerRepository;
pub use user::{GiftDebitFailure, StarsDebitFailure, UserRepository};

/// Base trait shared by every repository port.
pub trait Repository {
    /// Infrastructure error type of the backing store.
    type Error: std::error::Error + Send + Sync + 'static;
}

/// A marker trait that combines all repository functionality.
///
/// This trait serves as a composition point for the repository traits,
/// allowing the server to depend on a single bound that provides every
/// persistence capability the coordinators and the round processor need.
pub trait AuctionStore:
    Repository
    + UserRepository
    + AuctionRepository
    + LedgerRepository
    + JobStore
    + Clone
    + Send
    + Sync
    + 'static
{
}
