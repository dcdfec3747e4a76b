pub mod auctions;
pub mod bids;
pub mod streams;
pub mod testmode;
pub mod users;
