//! The round processor: job handlers driving the auction state machine.
//!
//! Every durable-store write in here is idempotent (conditional state
//! transitions, op-id-keyed ledger upserts, a guarded winner append), so a
//! job may fire any number of times. Partial progress never duplicates a
//! credit or a debit; at worst it leaves a loser's records ACTIVE until the
//! next run finalizes them.

use crate::{AppState, producers};
use sga_core::models::{
    Auction, AuctionId, JobKind, JobRecord, TransactionRecord, TransactionStatus, UserId, Winner,
    no_bid_refund_op_id, unclaimed_op_id,
};
use sga_core::ports::AuctionStore;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{Level, event};

/// Why a settlement job failed; the worker requeues the job on any of
/// these.
#[derive(Debug, Error)]
pub enum JobError<E: std::error::Error> {
    /// The durable store failed
    #[error("store error: {0}")]
    Store(#[from] E),
    /// A winner's settlement task failed
    #[error("winner settlement failed: {0}")]
    Winner(String),
}

/// Execute one claimed scheduler job.
pub async fn execute_job<T: AuctionStore>(
    state: &AppState<T>,
    job: &JobRecord,
) -> Result<(), JobError<T::Error>> {
    match job.kind {
        JobKind::StartRound { auction_id, round } => {
            handle_start_round(state, auction_id, round).await
        }
        JobKind::EndRound { auction_id, round } => {
            handle_end_round(state, auction_id, round).await
        }
    }
}

async fn handle_start_round<T: AuctionStore>(
    state: &AppState<T>,
    auction_id: AuctionId,
    round: i64,
) -> Result<(), JobError<T::Error>> {
    let Some(auction) = state.store.get_auction(auction_id).await? else {
        event!(Level::WARN, %auction_id, "start job for a missing auction");
        return Ok(());
    };
    let Some(round_def) = auction.round(round) else {
        event!(Level::WARN, %auction_id, round, "start job for a missing round");
        return Ok(());
    };

    let now = OffsetDateTime::now_utc();
    let round_end = now + Duration::seconds(round_def.duration_secs);

    // The conditional PENDING -> ACTIVE transition defeats concurrent
    // fires; the loser of the race just drops the event.
    if !state.store.start_auction(auction_id, round, round_end).await? {
        event!(Level::DEBUG, %auction_id, round, "duplicate start-round dropped");
        return Ok(());
    }

    state
        .store
        .schedule_job(&JobRecord::new(
            JobKind::EndRound { auction_id, round },
            round_end,
        ))
        .await?;

    event!(
        Level::INFO,
        %auction_id,
        round,
        round_end = round_end.unix_timestamp(),
        "round opened"
    );
    producers::notify_auction_update(state, auction_id);
    Ok(())
}

async fn handle_end_round<T: AuctionStore>(
    state: &AppState<T>,
    auction_id: AuctionId,
    round: i64,
) -> Result<(), JobError<T::Error>> {
    // Leaving ACTIVE before reading the top-N is what makes late bids lose
    // the race cleanly: they observe AUCTION_NOT_ACTIVE instead of landing
    // in a half-settled round.
    if !state.store.mark_settling(auction_id, round).await? {
        event!(Level::DEBUG, %auction_id, round, "duplicate end-round dropped");
        return Ok(());
    }

    let Some(auction) = state.store.get_auction(auction_id).await? else {
        event!(Level::WARN, %auction_id, "end job for a missing auction");
        return Ok(());
    };
    let Some(round_def) = auction.round(round) else {
        event!(Level::WARN, %auction_id, round, "end job for a missing round");
        return Ok(());
    };
    let prizes = round_def.prizes.clone();
    let now = OffsetDateTime::now_utc();

    let top = state.board.top_bidders(auction_id, prizes.len());
    let mut winners: Vec<Winner>;

    if top.is_empty() {
        winners = vec![refund_whole_round(state, &auction, round, now).await?];
    } else {
        let mut tasks = tokio::task::JoinSet::new();
        for (index, (user_id, amount)) in top.iter().enumerate() {
            let state = state.clone();
            let gift_name = auction.gift_name.clone();
            let (user_id, amount) = (*user_id, *amount);
            let place = index as i64 + 1;
            let prize = prizes[index];
            tasks.spawn(async move {
                settle_winner(
                    &state, auction_id, user_id, round, place, amount, prize, &gift_name, now,
                )
                .await
            });
        }

        winners = Vec::with_capacity(top.len());
        while let Some(joined) = tasks.join_next().await {
            let winner = joined.map_err(|error| JobError::Winner(error.to_string()))??;
            winners.push(winner);
        }
        winners.sort_by_key(|winner| winner.place);

        // Residual slots convert to an author refund; they do not take a
        // winner record, so the round's records stay aligned with places.
        if top.len() < prizes.len() {
            refund_unclaimed(state, &auction, round, &prizes[top.len()..], now).await?;
        }
    }

    if !state.store.append_winners(auction_id, round, &winners).await? {
        event!(Level::DEBUG, %auction_id, round, "winner records already appended");
    }

    let next_round = round + 1;
    if let Some(next_def) = auction.round(next_round) {
        let round_end = now + Duration::seconds(next_def.duration_secs);
        state
            .store
            .advance_round(auction_id, next_round, round_end)
            .await?;
        state
            .store
            .schedule_job(&JobRecord::new(
                JobKind::EndRound {
                    auction_id,
                    round: next_round,
                },
                round_end,
            ))
            .await?;
        event!(Level::INFO, %auction_id, round = next_round, "round opened");
    } else {
        // Losers keep their stake across intermediate rounds; only the
        // final settlement releases the remaining locks.
        for loser in state.board.bidders(auction_id) {
            state
                .store
                .settle_bid_records(auction_id, loser, TransactionStatus::Lost)
                .await?;
        }
        state.board.clear_auction(auction_id);
        state.store.finish_auction(auction_id).await?;
        event!(Level::INFO, %auction_id, "auction finished");
    }

    state.extensions.clear_round(auction_id, round);
    producers::notify_auction_update(state, auction_id);
    Ok(())
}

/// Settle one winner: WIN ledger record, star debit, gift credit, cache
/// removal, ACTIVE -> WON. Runs under the winner's user mutex; the ledger
/// upsert gates the balance movements so a re-run cannot double-apply them.
#[allow(clippy::too_many_arguments)]
async fn settle_winner<T: AuctionStore>(
    state: &AppState<T>,
    auction_id: AuctionId,
    user_id: UserId,
    round: i64,
    place: i64,
    amount: i64,
    prize: i64,
    gift_name: &str,
    now: OffsetDateTime,
) -> Result<Winner, JobError<T::Error>> {
    let _guard = state
        .locks
        .acquire(user_id)
        .await
        .map_err(|_| JobError::Winner(format!("user lock timed out for {user_id}")))?;

    let record = TransactionRecord::win(auction_id, user_id, round, place, amount, prize, now);
    let first_run = state.store.upsert_transaction(&record).await?;
    if first_run {
        if state.store.debit_stars(user_id, amount).await?.is_err() {
            // The locked total should always cover a winning bid; a miss
            // here means the ledger and the balance diverged.
            event!(
                Level::ERROR,
                %auction_id,
                %user_id,
                amount,
                "winner debit exceeded the balance"
            );
        }
        state.store.credit_gifts(user_id, gift_name, prize).await?;
        event!(
            Level::INFO,
            op_id = %record.op_id,
            %user_id,
            stars = amount,
            prize,
            "winner settled"
        );
    }

    state.board.remove_bid(auction_id, user_id);
    state
        .store
        .settle_bid_records(auction_id, user_id, TransactionStatus::Won)
        .await?;

    Ok(Winner {
        round,
        place,
        user_id,
        stars: amount,
        prize,
    })
}

/// Nobody bid: the whole prize vector returns to the author as the
/// round's "place 0" record.
async fn refund_whole_round<T: AuctionStore>(
    state: &AppState<T>,
    auction: &Auction,
    round: i64,
    now: OffsetDateTime,
) -> Result<Winner, JobError<T::Error>> {
    let total: i64 = auction
        .round(round)
        .map(|def| def.total_prizes())
        .unwrap_or(0);
    let op_id = no_bid_refund_op_id(auction.auction_id, auction.author_id, round);
    refund_author(state, auction, round, total, op_id, now).await?;
    Ok(Winner {
        round,
        place: 0,
        user_id: auction.author_id,
        stars: 0,
        prize: total,
    })
}

/// Fewer bidders than slots: the residual prizes return to the author.
async fn refund_unclaimed<T: AuctionStore>(
    state: &AppState<T>,
    auction: &Auction,
    round: i64,
    unclaimed: &[i64],
    now: OffsetDateTime,
) -> Result<(), JobError<T::Error>> {
    let total: i64 = unclaimed.iter().sum();
    let op_id = unclaimed_op_id(auction.auction_id, auction.author_id, round);
    refund_author(state, auction, round, total, op_id, now).await
}

async fn refund_author<T: AuctionStore>(
    state: &AppState<T>,
    auction: &Auction,
    round: i64,
    total: i64,
    op_id: String,
    now: OffsetDateTime,
) -> Result<(), JobError<T::Error>> {
    let record = TransactionRecord::refund(
        op_id,
        auction.auction_id,
        auction.author_id,
        round,
        total,
        now,
    );
    // The op-id gates the credit: a retried settlement sees the existing
    // record and skips the movement.
    if state.store.upsert_transaction(&record).await? {
        state
            .store
            .credit_gifts(auction.author_id, &auction.gift_name, total)
            .await?;
        event!(
            Level::INFO,
            op_id = %record.op_id,
            author_id = %auction.author_id,
            prize = total,
            "prizes refunded to author"
        );
    }
    Ok(())
}
