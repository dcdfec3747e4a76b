#![warn(missing_docs)]
//! The fast store of the auction system.
//!
//! This crate is the hot-path counterpart to the durable store: a
//! lock-serialized bid board whose admission operation updates the user bid
//! map, the auction ranking and the idempotency slot as one atomic step,
//! plus the per-user mutex, the request rate limiter, the anti-snipe
//! extension counters and the pub/sub hub the notification producers write
//! to.
//!
//! Nothing in here is authoritative for money. The board is a performance
//! cache over the ledger; after a crash it is the ledger that decides what
//! a user has locked.

mod board;
mod extend;
mod hub;
mod idem;
mod mutex;
mod rate;

pub use board::BidBoard;
pub use extend::ExtensionCounters;
pub use hub::UpdateHub;
pub use idem::{OpCache, OpState};
pub use mutex::{LockConfig, LockTimeout, UserGuard, UserLocks};
pub use rate::{RateExceeded, RateLimit, RateLimiter};
