//! Re-running a settlement job must not move any additional money, append
//! extra winner records or write new ledger rows.

use sga_core::models::{
    AuctionId, JobKind, JobRecord, RawAuctionDto, RawRoundDto, TransactionRecord, UserId,
};
use sga_core::ports::{AuctionRepository, LedgerRepository, UserRepository};
use sga_server::{AppState, ServerConfig, execute_job};
use sga_sqlite::{Database, Storage};
use time::OffsetDateTime;

fn test_state() -> AppState<Database> {
    let database = Database::open_storage(Storage::Memory(format!(
        "settle-{}",
        UserId::generate()
    )))
    .expect("database should open");
    sga_server::state(database, ServerConfig::default())
}

async fn seeded_running_auction(
    state: &AppState<Database>,
    author: UserId,
    prizes: Vec<i64>,
) -> AuctionId {
    state.store.ensure_user(author).await.unwrap();
    let committed: i64 = prizes.iter().sum();
    state
        .store
        .credit_gifts(author, "Diamond", committed)
        .await
        .unwrap();
    state
        .store
        .debit_gifts(author, "Diamond", committed)
        .await
        .unwrap()
        .unwrap();

    let now = OffsetDateTime::now_utc();
    let auction = RawAuctionDto {
        name: "Settle twice".into(),
        gift_name: "Diamond".into(),
        gift_count: committed,
        start_time: (now.unix_timestamp()) * 1_000,
        rounds: vec![RawRoundDto {
            duration: 60,
            prizes,
        }],
    }
    .into_auction(AuctionId::generate(), author, now)
    .unwrap();
    state.store.create_auction(&auction).await.unwrap();
    assert!(
        state
            .store
            .start_auction(auction.auction_id, 0, now + time::Duration::seconds(60))
            .await
            .unwrap()
    );
    auction.auction_id
}

/// Admit a bid the way the coordinator does: board script plus ledger row.
async fn admit_bid(
    state: &AppState<Database>,
    auction_id: AuctionId,
    user_id: UserId,
    amount: i64,
    key: &str,
) {
    state.store.ensure_user(user_id).await.unwrap();
    state.store.credit_stars(user_id, 500).await.unwrap();

    let now = OffsetDateTime::now_utc();
    let placement = state.board.place(
        user_id,
        auction_id,
        amount,
        &key.parse().unwrap(),
        500,
        now,
    );
    assert!(!placement.idempotent);
    state
        .store
        .upsert_transaction(&TransactionRecord::bet(
            key.to_owned(),
            user_id,
            auction_id,
            0,
            amount,
            0,
            now,
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn rerunning_end_round_is_a_no_op() -> anyhow::Result<()> {
    let state = test_state();
    let author = UserId::generate();
    let auction_id = seeded_running_auction(&state, author, vec![2, 1]).await;

    let (first, second) = (UserId::generate(), UserId::generate());
    admit_bid(&state, auction_id, first, 300, "settle-bid-first").await;
    admit_bid(&state, auction_id, second, 100, "settle-bid-second").await;

    let job = JobRecord::new(
        JobKind::EndRound {
            auction_id,
            round: 0,
        },
        OffsetDateTime::now_utc(),
    );
    execute_job(&state, &job).await?;

    let snapshot = |user: UserId| {
        let store = state.store.clone();
        async move {
            let account = store.get_user(user).await.unwrap().unwrap();
            (account.balance, account.gift_count("Diamond"))
        }
    };
    assert_eq!(snapshot(first).await, (200, 2));
    assert_eq!(snapshot(second).await, (400, 1));
    assert_eq!(state.store.locked_amount(first).await?, 0);

    let auction = state.store.get_auction(auction_id).await?.unwrap();
    assert_eq!(auction.winners.len(), 2);
    let ledger_before = state.store.transactions_for_user(first, 100).await?.len();

    // Replays of the same job change nothing.
    execute_job(&state, &job).await?;
    execute_job(&state, &job).await?;

    assert_eq!(snapshot(first).await, (200, 2));
    assert_eq!(snapshot(second).await, (400, 1));
    let auction = state.store.get_auction(auction_id).await?.unwrap();
    assert_eq!(auction.winners.len(), 2);
    assert_eq!(
        state.store.transactions_for_user(first, 100).await?.len(),
        ledger_before
    );
    Ok(())
}

#[tokio::test]
async fn rerunning_the_empty_round_refund_is_a_no_op() -> anyhow::Result<()> {
    let state = test_state();
    let author = UserId::generate();
    let auction_id = seeded_running_auction(&state, author, vec![3, 2, 1]).await;

    let job = JobRecord::new(
        JobKind::EndRound {
            auction_id,
            round: 0,
        },
        OffsetDateTime::now_utc(),
    );
    execute_job(&state, &job).await?;
    execute_job(&state, &job).await?;

    let account = state.store.get_user(author).await?.unwrap();
    assert_eq!(account.gift_count("Diamond"), 6);

    let auction = state.store.get_auction(auction_id).await?.unwrap();
    assert_eq!(auction.winners.len(), 1);
    assert_eq!(auction.winners[0].place, 0);
    assert_eq!(state.store.transactions_for_user(author, 100).await?.len(), 1);
    Ok(())
}
