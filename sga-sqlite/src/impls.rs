mod auctions;
mod jobs;
mod ledger;
mod users;

use crate::db::{self, Database};
use sga_core::ports::{AuctionStore, Repository};

impl Repository for Database {
    type Error = db::Error;
}

impl AuctionStore for Database {}
