//! Configuration types for the HTTP server and its background loops.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration for the auction API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// The address to bind the server to
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Bid requests allowed per user per second
    #[serde(default = "default_bid_per_second")]
    pub bid_per_second: u32,

    /// Auction creations allowed per user per minute
    #[serde(default = "default_create_per_minute")]
    pub create_per_minute: u32,

    /// Caller-scoped reads allowed per user per second
    #[serde(default = "default_read_per_second")]
    pub read_per_second: u32,

    /// How many scheduler jobs may run concurrently
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Enable the star/gift top-up route used by test harnesses.
    /// Never set in production.
    #[serde(default)]
    pub testmode: bool,
}

fn default_bind_address() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_bid_per_second() -> u32 {
    5
}

fn default_create_per_minute() -> u32 {
    3
}

fn default_read_per_second() -> u32 {
    20
}

fn default_worker_concurrency() -> usize {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bid_per_second: default_bid_per_second(),
            create_per_minute: default_create_per_minute(),
            read_per_second: default_read_per_second(),
            worker_concurrency: default_worker_concurrency(),
            testmode: false,
        }
    }
}
