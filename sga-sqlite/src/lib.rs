#![warn(missing_docs)]
//! SQLite implementation of the auction system's durable-store ports.
//!
//! Everything authoritative lives here: user balances and gift holdings,
//! auction documents with their winner records, the transaction ledger and
//! the delayed-job queue. The fast cache can always be rebuilt from these
//! tables; the reverse is never true.

pub mod db;

mod datetime;
mod impls;

pub use datetime::DateTime;
pub use db::{Database, Error, Storage};

// This manages our database setup/migrations
mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("./sql");
}
