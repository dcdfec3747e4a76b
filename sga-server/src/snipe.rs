//! Anti-snipe round extension.
//!
//! A winning bid that lands inside the final seconds of a round pushes the
//! deadline out, up to a bounded number of times per round. The *real*
//! remaining time is re-derived from the pending end-round job, not from
//! the auction document, so two requests acting on the same stale snapshot
//! cannot both extend.

use crate::AppState;
use sga_core::models::{Auction, UserId, end_round_job_id};
use sga_core::ports::AuctionStore;
use std::time::Duration as StdDuration;
use time::{Duration, OffsetDateTime};
use tracing::{Level, event};

/// A bid inside this window of the deadline qualifies for an extension.
pub const SNIPE_THRESHOLD: Duration = Duration::seconds(10);
/// How far one extension pushes the deadline.
pub const EXTENSION: Duration = Duration::seconds(5);
/// Extensions allowed per round.
pub const MAX_EXTENSIONS: u32 = 5;

/// Check an admitted bid against the extension rules; returns whether the
/// round was extended.
///
/// `auction` may be a pre-bid snapshot: the worst it causes is one wasted
/// check, because the decision rests on the job's scheduled fire time.
pub async fn maybe_extend<T: AuctionStore>(
    state: &AppState<T>,
    auction: &Auction,
    user_id: UserId,
    now: OffsetDateTime,
) -> Result<bool, T::Error> {
    let round = auction.current_round;
    let Some(round_def) = auction.round(round) else {
        return Ok(false);
    };
    let Some(end_time) = auction.round_end_time else {
        return Ok(false);
    };

    // Cheap pre-filter on the snapshot deadline.
    let remaining = end_time - now;
    if remaining <= Duration::ZERO || remaining > SNIPE_THRESHOLD {
        return Ok(false);
    }

    // Only a bid currently holding a prize slot extends the round.
    if !state
        .board
        .is_in_top(auction.auction_id, user_id, round_def.prizes.len())
    {
        return Ok(false);
    }

    let job_id = end_round_job_id(auction.auction_id, round);
    let Some(run_at) = state.store.job_run_at(&job_id).await? else {
        // The round is already being settled.
        return Ok(false);
    };
    let real_remaining = run_at - now;
    if real_remaining <= Duration::ZERO {
        return Ok(false);
    }
    if real_remaining > SNIPE_THRESHOLD {
        // Another request extended the round first.
        return Ok(false);
    }

    let counter_ttl: StdDuration = (real_remaining + EXTENSION + Duration::minutes(1))
        .try_into()
        .unwrap_or(StdDuration::from_secs(60));
    if !state
        .extensions
        .try_claim(auction.auction_id, round, MAX_EXTENSIONS, counter_ttl)
    {
        return Ok(false);
    }

    let new_deadline = now + real_remaining + EXTENSION;
    if !state.store.reschedule_job(&job_id, new_deadline).await? {
        // The job fired while we were deciding; nothing to extend.
        return Ok(false);
    }
    state
        .store
        .set_round_end_time(auction.auction_id, new_deadline)
        .await?;

    event!(
        Level::INFO,
        auction_id = %auction.auction_id,
        round,
        %user_id,
        deadline = new_deadline.unix_timestamp(),
        "round extended"
    );
    Ok(true)
}
