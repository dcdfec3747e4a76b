use crate::{AppState, Caller, IdemKey, Now, error::ApiError, producers, snipe};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use sga_cache::RateLimit;
use sga_core::models::{
    AuctionId, BidOutcome, BidPlacement, BidRow, StoredOutcome, TransactionRecord,
};
use sga_core::ports::AuctionStore;
use tracing::{Level, event};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct PlaceBidDto {
    /// The requested bid, in stars. Must not be below the current bid.
    stars: i64,
}

/// Outcome code of an accepted bid request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub enum BidStatus {
    /// The bid was admitted
    #[serde(rename = "OK")]
    Ok,
    /// The amount matched the current bid; nothing changed
    #[serde(rename = "SAME")]
    Same,
}

#[derive(Serialize, ToSchema)]
pub struct PlaceBidResponse {
    success: bool,
    status: BidStatus,
    /// True when this response was replayed from the idempotency slot
    idempotent: bool,
    /// The current bid after the request
    bet: i64,
    /// The bid before the request
    previous_bet: i64,
    /// Stars newly locked by the request
    charged: i64,
    /// True when the bid triggered an anti-snipe round extension
    extended: bool,
}

#[utoipa::path(
    post,
    path = "/v0/auctions/{auction_id}/bids",
    request_body = PlaceBidDto,
    params(("auction_id" = String, Path, description = "Auction to bid in")),
    responses(
        (status = OK, body = PlaceBidResponse),
        (status = UNAUTHORIZED),
        (status = BAD_REQUEST),
        (status = NOT_FOUND),
        (status = TOO_MANY_REQUESTS)
    ),
    tags = ["bids"]
)]
/// Place or raise a bid in an auction.
pub async fn place_bid<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Now(now): Now,
    // Extractors run in declaration order: the idempotency key format is
    // checked before anything else about the request, caller id included.
    IdemKey(key): IdemKey,
    Caller(user_id): Caller,
    Path(auction_id): Path<String>,
    Json(PlaceBidDto { stars }): Json<PlaceBidDto>,
) -> Result<Json<PlaceBidResponse>, ApiError> {
    state.limiter.check(
        "bid",
        user_id,
        RateLimit::per_second(state.config.bid_per_second),
    )?;

    let auction_id: AuctionId = auction_id.parse().map_err(|_| ApiError::InvalidAuctionId)?;
    if stars <= 0 {
        return Err(ApiError::InvalidStarsAmount);
    }

    let auction = state
        .store
        .get_auction(auction_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuctionNotFound)?;
    if !auction.is_open_for_bids() {
        return Err(ApiError::AuctionNotActive);
    }
    if auction.author_id == user_id {
        return Err(ApiError::CannotBetOwnAuction);
    }

    state
        .store
        .ensure_user(user_id)
        .await
        .map_err(ApiError::internal)?;

    // The balance read and the admission script form one critical section
    // under the user's mutex; nothing else may move this user's money in
    // between.
    let placement: Result<BidPlacement, ApiError> = state
        .locks
        .with_lock(user_id, async || {
            // Re-check under the lock: settlement may have flipped the
            // auction out of ACTIVE since the snapshot above.
            let auction = state
                .store
                .get_auction(auction_id)
                .await
                .map_err(ApiError::internal)?
                .ok_or(ApiError::AuctionNotFound)?;
            if !auction.is_open_for_bids() {
                return Err(ApiError::AuctionNotActive);
            }

            let balance = state
                .store
                .get_user(user_id)
                .await
                .map_err(ApiError::internal)?
                .map(|account| account.balance)
                .unwrap_or(0);
            let locked = state
                .store
                .locked_amount(user_id)
                .await
                .map_err(ApiError::internal)?;

            let placement =
                state
                    .board
                    .place(user_id, auction_id, stars, &key, balance - locked, now);

            // OK and SAME write (or re-write) the matching ledger row. The
            // upsert runs on idempotent replays too: that is what heals a
            // crash between the admission script and the first write.
            if let Some(stored) = StoredOutcome::from_outcome(&placement.outcome) {
                let record = TransactionRecord::bet(
                    key.to_string(),
                    user_id,
                    auction_id,
                    auction.current_round,
                    stored.bet,
                    stored.previous_bet,
                    now,
                );
                state
                    .store
                    .upsert_transaction(&record)
                    .await
                    .map_err(ApiError::internal)?;
                event!(
                    Level::INFO,
                    %user_id,
                    %auction_id,
                    bet = stored.bet,
                    charged = stored.charged,
                    idempotent = placement.idempotent,
                    "bid admitted"
                );
            }
            Ok(placement)
        })
        .await?;
    let placement = placement?;

    let (status, bet, previous_bet, charged) = match placement.outcome {
        BidOutcome::Ok {
            bet,
            previous_bet,
            charged,
        } => (BidStatus::Ok, bet, previous_bet, charged),
        BidOutcome::Same { bet } => (BidStatus::Same, bet, bet, 0),
        BidOutcome::CannotDecrease { .. } => return Err(ApiError::CannotDecrease),
        BidOutcome::InsufficientBalance { .. } => return Err(ApiError::InsufficientBalance),
    };

    // A fresh admission near the deadline may extend the round; replays
    // had their chance the first time around.
    let mut extended = false;
    if status == BidStatus::Ok && !placement.idempotent {
        extended = snipe::maybe_extend(&state, &auction, user_id, now)
            .await
            .unwrap_or_else(|error| {
                event!(Level::WARN, %error, %auction_id, "anti-snipe check failed");
                false
            });
        producers::notify_auction_update(&state, auction_id);
    }

    Ok(Json(PlaceBidResponse {
        success: true,
        status,
        idempotent: placement.idempotent,
        bet,
        previous_bet,
        charged,
        extended,
    }))
}

#[derive(Deserialize)]
pub struct BidListParams {
    limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/v0/auctions/{auction_id}/bids",
    params(("auction_id" = String, Path, description = "Auction to list")),
    responses(
        (status = OK, body = Vec<BidRow>),
        (status = NOT_FOUND)
    ),
    tags = ["bids"]
)]
/// The auction's ranked bids, best first.
pub async fn list_bids<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Path(auction_id): Path<String>,
    Query(params): Query<BidListParams>,
) -> Result<Json<Vec<BidRow>>, ApiError> {
    let auction_id: AuctionId = auction_id.parse().map_err(|_| ApiError::InvalidAuctionId)?;
    state
        .store
        .get_auction(auction_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuctionNotFound)?;

    let limit = params.limit.unwrap_or(10).min(100);
    let rows = state
        .board
        .top_bidders(auction_id, limit)
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, amount))| BidRow {
            place: i as i64 + 1,
            user_id,
            amount,
        })
        .collect();
    Ok(Json(rows))
}

#[derive(Serialize, ToSchema)]
pub struct MyBidResponse {
    /// The caller's current bid (0 when not participating)
    bet: i64,
    /// The caller's 1-based rank, when participating
    rank: Option<u64>,
    /// Live bidder count
    total_participants: u64,
}

#[utoipa::path(
    get,
    path = "/v0/auctions/{auction_id}/bids/me",
    params(("auction_id" = String, Path, description = "Auction to inspect")),
    responses(
        (status = OK, body = MyBidResponse),
        (status = UNAUTHORIZED),
        (status = NOT_FOUND)
    ),
    tags = ["bids"]
)]
/// The caller's standing in an auction.
pub async fn my_bid<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Caller(user_id): Caller,
    Path(auction_id): Path<String>,
) -> Result<Json<MyBidResponse>, ApiError> {
    state.limiter.check(
        "read",
        user_id,
        RateLimit::per_second(state.config.read_per_second),
    )?;

    let auction_id: AuctionId = auction_id.parse().map_err(|_| ApiError::InvalidAuctionId)?;
    state
        .store
        .get_auction(auction_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuctionNotFound)?;

    let bet = state.board.current_bid(user_id, auction_id).unwrap_or(0);
    let (rank, total) = match state.board.rank_of(auction_id, user_id) {
        Some((rank, total)) => (Some(rank), total),
        None => (None, state.board.participants(auction_id)),
    };

    Ok(Json(MyBidResponse {
        bet,
        rank,
        total_participants: total,
    }))
}
