//! API-surface tests: validation codes, create idempotency, anti-snipe.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{Value, json};
use sga_core::models::UserId;
use std::time::Duration;

#[tokio::test]
async fn bid_validation_codes() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 1))).await;
    let auction_id = create_auction(
        &server,
        author,
        "validation-create",
        0,
        1,
        json!([{ "duration": 60, "prizes": [1] }]),
    )
    .await;
    wait_for_state(&server, &auction_id, "ACTIVE", Duration::from_secs(3)).await;
    let bidder = UserId::generate();

    // No caller header.
    let response = server
        .post(&format!("/v0/auctions/{auction_id}/bids"))
        .add_header("idempotency-key", "missing-user-key")
        .json(&json!({ "stars": 100 }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "USER_NOT_PROVIDED");

    // Malformed idempotency key.
    let response = server
        .post(&format!("/v0/auctions/{auction_id}/bids"))
        .add_header("x-user-id", bidder.to_string())
        .add_header("idempotency-key", "short")
        .json(&json!({ "stars": 100 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "INVALID_IDEMPOTENCY_KEY");

    // When both are bad, the key check wins: it is step one of the bid
    // pipeline, ahead of caller validation.
    let response = server
        .post(&format!("/v0/auctions/{auction_id}/bids"))
        .add_header("idempotency-key", "short")
        .json(&json!({ "stars": 100 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "INVALID_IDEMPOTENCY_KEY");

    // Unparseable auction id.
    let response = place_bid(&server, bidder, "not-an-id", 100, "validation-bid-1").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "INVALID_AUCTION_ID");

    // Unknown auction.
    let ghost = UserId::generate(); // any uuid will do
    let response = place_bid(&server, bidder, &ghost.to_string(), 100, "validation-bid-2").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "AUCTION_NOT_FOUND");

    // Non-positive amount.
    let response = place_bid(&server, bidder, &auction_id, 0, "validation-bid-3").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "INVALID_STARS_AMOUNT");

    // Authors cannot bid at home.
    topup(&server, author, 100, None).await;
    let response = place_bid(&server, author, &auction_id, 100, "validation-bid-4").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "CANNOT_BET_OWN_AUCTION");

    // A fresh user has nothing to lock.
    let response = place_bid(&server, bidder, &auction_id, 100, "validation-bid-5").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "INSUFFICIENT_BALANCE");
    Ok(())
}

#[tokio::test]
async fn pending_auctions_reject_bids() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 1))).await;
    // Starts an hour from now.
    let auction_id = create_auction(
        &server,
        author,
        "pending-create-1",
        3_600,
        1,
        json!([{ "duration": 60, "prizes": [1] }]),
    )
    .await;

    let bidder = UserId::generate();
    topup(&server, bidder, 500, None).await;
    let response = place_bid(&server, bidder, &auction_id, 100, "pending-bid-1").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "AUCTION_NOT_ACTIVE");
    Ok(())
}

#[tokio::test]
async fn create_is_idempotent_and_debits_once() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 10))).await;

    let body = json!({
        "name": "Replay drop",
        "gift_name": "Diamond",
        "gift_count": 6,
        "start_time": epoch_ms(3_600),
        "rounds": [{ "duration": 30, "prizes": [3, 2, 1] }],
    });

    let first = server
        .post("/v0/auctions")
        .add_header("x-user-id", author.to_string())
        .add_header("idempotency-key", "create-replay-key")
        .json(&body)
        .await;
    first.assert_status_ok();
    let first: Value = first.json();
    assert_eq!(first["idempotent"], false);

    let replay = server
        .post("/v0/auctions")
        .add_header("x-user-id", author.to_string())
        .add_header("idempotency-key", "create-replay-key")
        .json(&body)
        .await;
    replay.assert_status_ok();
    let replay: Value = replay.json();
    assert_eq!(replay["idempotent"], true);
    assert_eq!(
        replay["auction"]["auction_id"],
        first["auction"]["auction_id"]
    );

    // One debit, not two.
    assert_eq!(gift_count(&profile(&server, author).await, "Diamond"), 4);
    Ok(())
}

#[tokio::test]
async fn insufficient_gifts_releases_the_key() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 2))).await;

    let body = json!({
        "name": "Underfunded drop",
        "gift_name": "Diamond",
        "gift_count": 6,
        "start_time": epoch_ms(3_600),
        "rounds": [{ "duration": 30, "prizes": [3, 2, 1] }],
    });

    let response = server
        .post("/v0/auctions")
        .add_header("x-user-id", author.to_string())
        .add_header("idempotency-key", "underfunded-key-1")
        .json(&body)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "INSUFFICIENT_GIFTS");

    // Nothing was debited, and the key is free for the corrected retry.
    assert_eq!(gift_count(&profile(&server, author).await, "Diamond"), 2);
    topup(&server, author, 0, Some(("Diamond", 4))).await;
    let response = server
        .post("/v0/auctions")
        .add_header("x-user-id", author.to_string())
        .add_header("idempotency-key", "underfunded-key-1")
        .json(&body)
        .await;
    response.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn late_top_bid_extends_the_round_once_qualified() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 1))).await;
    let auction_id = create_auction(
        &server,
        author,
        "snipe-create-12s",
        0,
        1,
        json!([{ "duration": 12, "prizes": [1] }]),
    )
    .await;
    wait_for_state(&server, &auction_id, "ACTIVE", Duration::from_secs(3)).await;
    let original_end = get_auction(&server, &auction_id).await["auction"]["round_end_time"]
        .as_i64()
        .unwrap();

    let (early, sniper) = (UserId::generate(), UserId::generate());
    topup(&server, early, 500, None).await;
    topup(&server, sniper, 500, None).await;

    // Far from the deadline: no extension.
    let response = place_bid(&server, early, &auction_id, 100, "snipe-early-bid").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["extended"], false);

    // Inside the final stretch, a bid that takes the lead extends.
    tokio::time::sleep(Duration::from_secs(9)).await;
    let response = place_bid(&server, sniper, &auction_id, 150, "snipe-late-bid1").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["extended"], true);

    let new_end = get_auction(&server, &auction_id).await["auction"]["round_end_time"]
        .as_i64()
        .unwrap();
    assert!(
        new_end >= original_end + 4_000,
        "deadline moved from {original_end} to {new_end}"
    );

    wait_for_state(&server, &auction_id, "FINISHED", Duration::from_secs(15)).await;
    let account = profile(&server, sniper).await;
    assert_eq!(gift_count(&account, "Diamond"), 1);
    Ok(())
}
