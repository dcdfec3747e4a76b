#![allow(dead_code)] // each test binary pulls in the subset it needs

use axum_test::TestServer;
use serde_json::{Value, json};
use sga_core::models::UserId;
use sga_server::ServerConfig;
use sga_sqlite::{Database, Storage};
use std::time::Duration;

/// Spin up the full service (router + job workers) over a fresh in-memory
/// store, with testmode on and the rate limits opened up so scenarios can
/// hammer the API.
pub fn harness() -> TestServer {
    let database = Database::open_storage(Storage::Memory(format!(
        "e2e-{}",
        UserId::generate()
    )))
    .expect("database should open");

    let config = ServerConfig {
        testmode: true,
        bid_per_second: 1_000,
        create_per_minute: 1_000,
        read_per_second: 10_000,
        ..ServerConfig::default()
    };

    let state = sga_server::state(database, config);
    let _workers = sga_server::spawn_workers(state.clone());
    TestServer::new(sga_server::router(state)).expect("server should build")
}

pub fn epoch_ms(offset_secs: i64) -> i64 {
    (time::OffsetDateTime::now_utc() + time::Duration::seconds(offset_secs)).unix_timestamp()
        * 1_000
}

/// Mint stars and/or gifts for a user through the testmode route.
pub async fn topup(server: &TestServer, user: UserId, stars: i64, gift: Option<(&str, i64)>) {
    let mut body = json!({ "stars": stars });
    if let Some((name, count)) = gift {
        body["gift_name"] = json!(name);
        body["gift_count"] = json!(count);
    }
    let response = server
        .post("/v0/test/topup")
        .add_header("x-user-id", user.to_string())
        .json(&body)
        .await;
    response.assert_status_ok();
}

/// Create a single-gift auction and return its id. `gift_count` must equal
/// the sum of the prize vectors.
pub async fn create_auction(
    server: &TestServer,
    author: UserId,
    key: &str,
    start_in_secs: i64,
    gift_count: i64,
    rounds: Value,
) -> String {
    let response = server
        .post("/v0/auctions")
        .add_header("x-user-id", author.to_string())
        .add_header("idempotency-key", key)
        .json(&json!({
            "name": "Diamond drop",
            "gift_name": "Diamond",
            "gift_count": gift_count,
            "start_time": epoch_ms(start_in_secs),
            "rounds": rounds,
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["auction"]["auction_id"]
        .as_str()
        .expect("auction id in response")
        .to_owned()
}

pub async fn place_bid(
    server: &TestServer,
    user: UserId,
    auction_id: &str,
    stars: i64,
    key: &str,
) -> axum_test::TestResponse {
    server
        .post(&format!("/v0/auctions/{auction_id}/bids"))
        .add_header("x-user-id", user.to_string())
        .add_header("idempotency-key", key)
        .json(&json!({ "stars": stars }))
        .await
}

pub async fn get_auction(server: &TestServer, auction_id: &str) -> Value {
    let response = server.get(&format!("/v0/auctions/{auction_id}")).await;
    response.assert_status_ok();
    response.json()
}

pub async fn balance(server: &TestServer, user: UserId) -> Value {
    let response = server
        .get("/v0/users/me/balance")
        .add_header("x-user-id", user.to_string())
        .await;
    response.assert_status_ok();
    response.json()
}

pub async fn profile(server: &TestServer, user: UserId) -> Value {
    let response = server
        .get("/v0/users/me")
        .add_header("x-user-id", user.to_string())
        .await;
    response.assert_status_ok();
    response.json()
}

pub fn gift_count(profile: &Value, name: &str) -> i64 {
    profile["gifts"]
        .as_array()
        .map(|gifts| {
            gifts
                .iter()
                .filter(|gift| gift["name"] == name)
                .map(|gift| gift["count"].as_i64().unwrap_or(0))
                .sum()
        })
        .unwrap_or(0)
}

/// Poll the auction until it reaches `state` or the timeout passes.
pub async fn wait_for_state(server: &TestServer, auction_id: &str, state: &str, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let body = get_auction(server, auction_id).await;
        if body["auction"]["state"] == state {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "auction {auction_id} never reached {state}; last seen {}",
                body["auction"]["state"]
            );
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
