//! End-to-end settlement scenarios against the full service: router, job
//! workers and an in-memory SQLite store.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{Value, json};
use sga_core::models::UserId;
use std::time::Duration;

#[tokio::test]
async fn happy_path_single_round() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 1_000, Some(("Diamond", 10))).await;

    let auction_id = create_auction(
        &server,
        author,
        "happy-path-create",
        0,
        6,
        json!([{ "duration": 3, "prizes": [3, 2, 1] }]),
    )
    .await;
    wait_for_state(&server, &auction_id, "ACTIVE", Duration::from_secs(3)).await;

    let bidders: Vec<UserId> = (0..4).map(|_| UserId::generate()).collect();
    for bidder in &bidders {
        topup(&server, *bidder, 500, None).await;
    }
    for (bidder, stars) in bidders.iter().zip([200, 150, 100, 50]) {
        let response = place_bid(
            &server,
            *bidder,
            &auction_id,
            stars,
            &format!("happy-bid-{stars}"),
        )
        .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "OK");
    }

    wait_for_state(&server, &auction_id, "FINISHED", Duration::from_secs(10)).await;

    // Winners pay their bid and receive the matching prize.
    for (bidder, (left, prize)) in bidders
        .iter()
        .zip([(300, 3), (350, 2), (400, 1), (500, 0)])
    {
        let account = profile(&server, *bidder).await;
        assert_eq!(account["balance"].as_i64(), Some(left));
        assert_eq!(gift_count(&account, "Diamond"), prize);

        let funds = balance(&server, *bidder).await;
        assert_eq!(funds["locked"].as_i64(), Some(0));
        assert_eq!(funds["available"], funds["balance"]);
    }

    // The author committed 6 of 10 Diamonds; all 6 were claimed.
    let account = profile(&server, author).await;
    assert_eq!(gift_count(&account, "Diamond"), 4);

    // P5: the winner records mirror the final ranking by place.
    let body = get_auction(&server, &auction_id).await;
    let winners = body["auction"]["winners"].as_array().unwrap();
    assert_eq!(winners.len(), 3);
    for (index, winner) in winners.iter().enumerate() {
        assert_eq!(winner["place"].as_i64(), Some(index as i64 + 1));
        assert_eq!(
            winner["user_id"].as_str(),
            Some(bidders[index].to_string().as_str())
        );
    }
    Ok(())
}

#[tokio::test]
async fn bids_never_decrease() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 1))).await;
    let auction_id = create_auction(
        &server,
        author,
        "monotone-create-1",
        0,
        1,
        json!([{ "duration": 60, "prizes": [1] }]),
    )
    .await;
    wait_for_state(&server, &auction_id, "ACTIVE", Duration::from_secs(3)).await;

    let bidder = UserId::generate();
    topup(&server, bidder, 500, None).await;

    place_bid(&server, bidder, &auction_id, 200, "monotone-bid-1")
        .await
        .assert_status_ok();

    let response = place_bid(&server, bidder, &auction_id, 100, "monotone-bid-2").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "CANNOT_DECREASE");

    let funds = balance(&server, bidder).await;
    assert_eq!(funds["locked"].as_i64(), Some(200));
    assert_eq!(funds["balance"].as_i64(), Some(500));
    Ok(())
}

#[tokio::test]
async fn admission_is_idempotent_under_replay() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 1))).await;
    let auction_id = create_auction(
        &server,
        author,
        "replay-create-1",
        0,
        1,
        json!([{ "duration": 60, "prizes": [1] }]),
    )
    .await;
    wait_for_state(&server, &auction_id, "ACTIVE", Duration::from_secs(3)).await;

    let bidder = UserId::generate();
    topup(&server, bidder, 500, None).await;

    let first = place_bid(&server, bidder, &auction_id, 200, "replayed-key-1").await;
    first.assert_status_ok();
    let first: Value = first.json();
    assert_eq!(first["idempotent"], false);
    assert_eq!(first["charged"].as_i64(), Some(200));

    for _ in 0..49 {
        let replay = place_bid(&server, bidder, &auction_id, 200, "replayed-key-1").await;
        replay.assert_status_ok();
        let replay: Value = replay.json();
        assert_eq!(replay["idempotent"], true);
        assert_eq!(replay["status"], "OK");
        assert_eq!(replay["bet"], first["bet"]);
        assert_eq!(replay["charged"], first["charged"]);
    }

    let funds = balance(&server, bidder).await;
    assert_eq!(funds["locked"].as_i64(), Some(200));

    // Exactly one ledger record, keyed by the idempotency key.
    let feed = server
        .get("/v0/users/me/transactions")
        .add_header("x-user-id", bidder.to_string())
        .await;
    feed.assert_status_ok();
    let feed: Value = feed.json();
    let records = feed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["op_id"], "replayed-key-1");
    assert_eq!(records[0]["kind"], "BET");
    Ok(())
}

#[tokio::test]
async fn empty_round_refunds_the_author() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 6))).await;

    let auction_id = create_auction(
        &server,
        author,
        "norefund-create-1",
        0,
        6,
        json!([{ "duration": 2, "prizes": [3, 2, 1] }]),
    )
    .await;

    // Committed gifts leave the author's holding immediately.
    assert_eq!(gift_count(&profile(&server, author).await, "Diamond"), 0);

    wait_for_state(&server, &auction_id, "FINISHED", Duration::from_secs(10)).await;

    // Everything comes back, and the round records a single place-0 refund.
    assert_eq!(gift_count(&profile(&server, author).await, "Diamond"), 6);

    let body = get_auction(&server, &auction_id).await;
    let winners = body["auction"]["winners"].as_array().unwrap();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0]["place"].as_i64(), Some(0));
    assert_eq!(winners[0]["prize"].as_i64(), Some(6));
    assert_eq!(
        winners[0]["user_id"].as_str(),
        Some(author.to_string().as_str())
    );

    let feed = server
        .get("/v0/users/me/transactions")
        .add_header("x-user-id", author.to_string())
        .await;
    let feed: Value = feed.json();
    let refund = feed
        .as_array()
        .unwrap()
        .iter()
        .find(|record| record["kind"] == "REFUND")
        .expect("a refund record");
    assert_eq!(
        refund["op_id"].as_str(),
        Some(format!("{auction_id}:{author}:win:0:place-0-refund").as_str())
    );
    Ok(())
}

#[tokio::test]
async fn double_spend_across_auctions_is_rejected() -> anyhow::Result<()> {
    let server = harness();
    let (author_a, author_b) = (UserId::generate(), UserId::generate());
    topup(&server, author_a, 0, Some(("Diamond", 1))).await;
    topup(&server, author_b, 0, Some(("Ruby", 1))).await;

    let first = server
        .post("/v0/auctions")
        .add_header("x-user-id", author_a.to_string())
        .add_header("idempotency-key", "double-spend-a")
        .json(&json!({
            "name": "A", "gift_name": "Diamond", "gift_count": 1,
            "start_time": epoch_ms(0),
            "rounds": [{ "duration": 60, "prizes": [1] }],
        }))
        .await;
    first.assert_status_ok();
    let first: Value = first.json();
    let auction_a = first["auction"]["auction_id"].as_str().unwrap().to_owned();

    let second = server
        .post("/v0/auctions")
        .add_header("x-user-id", author_b.to_string())
        .add_header("idempotency-key", "double-spend-b")
        .json(&json!({
            "name": "B", "gift_name": "Ruby", "gift_count": 1,
            "start_time": epoch_ms(0),
            "rounds": [{ "duration": 60, "prizes": [1] }],
        }))
        .await;
    second.assert_status_ok();
    let second: Value = second.json();
    let auction_b = second["auction"]["auction_id"].as_str().unwrap().to_owned();

    wait_for_state(&server, &auction_a, "ACTIVE", Duration::from_secs(3)).await;
    wait_for_state(&server, &auction_b, "ACTIVE", Duration::from_secs(3)).await;

    let bidder = UserId::generate();
    topup(&server, bidder, 500, None).await;

    // The whole balance, posted to both auctions at once.
    let (res_a, res_b) = tokio::join!(
        place_bid(&server, bidder, &auction_a, 500, "double-key-a"),
        place_bid(&server, bidder, &auction_b, 500, "double-key-b"),
    );

    let mut outcomes: Vec<(u16, Value)> = Vec::new();
    for response in [res_a, res_b] {
        outcomes.push((response.status_code().as_u16(), response.json()));
    }
    let accepted = outcomes.iter().filter(|(code, _)| *code == 200).count();
    assert_eq!(accepted, 1, "exactly one bid may lock the balance");
    let rejected = outcomes
        .iter()
        .find(|(code, _)| *code != 200)
        .map(|(_, body)| body.clone())
        .unwrap();
    assert_eq!(rejected["error"], "INSUFFICIENT_BALANCE");

    // Balance closure holds afterwards.
    let funds = balance(&server, bidder).await;
    assert_eq!(funds["balance"].as_i64(), Some(500));
    assert_eq!(funds["locked"].as_i64(), Some(500));
    assert_eq!(funds["available"].as_i64(), Some(0));
    Ok(())
}

#[tokio::test]
async fn multi_round_carries_losers_forward() -> anyhow::Result<()> {
    let server = harness();
    let author = UserId::generate();
    topup(&server, author, 0, Some(("Diamond", 3))).await;

    let auction_id = create_auction(
        &server,
        author,
        "tworound-create-1",
        0,
        3,
        json!([
            { "duration": 2, "prizes": [2] },
            { "duration": 2, "prizes": [1] }
        ]),
    )
    .await;
    wait_for_state(&server, &auction_id, "ACTIVE", Duration::from_secs(3)).await;

    let (winner, runner_up) = (UserId::generate(), UserId::generate());
    topup(&server, winner, 500, None).await;
    topup(&server, runner_up, 500, None).await;

    place_bid(&server, winner, &auction_id, 300, "tworound-bid-1")
        .await
        .assert_status_ok();
    place_bid(&server, runner_up, &auction_id, 100, "tworound-bid-2")
        .await
        .assert_status_ok();

    wait_for_state(&server, &auction_id, "FINISHED", Duration::from_secs(12)).await;

    // Round 0 went to the top bid; the carried-over bid won round 1.
    let winner_account = profile(&server, winner).await;
    assert_eq!(winner_account["balance"].as_i64(), Some(200));
    assert_eq!(gift_count(&winner_account, "Diamond"), 2);

    let runner_account = profile(&server, runner_up).await;
    assert_eq!(runner_account["balance"].as_i64(), Some(400));
    assert_eq!(gift_count(&runner_account, "Diamond"), 1);

    for user in [winner, runner_up] {
        let funds = balance(&server, user).await;
        assert_eq!(funds["locked"].as_i64(), Some(0));
    }

    let body = get_auction(&server, &auction_id).await;
    let winners = body["auction"]["winners"].as_array().unwrap();
    assert_eq!(winners.len(), 2);
    Ok(())
}
