use super::bids;
use crate::{AppState, Caller, IdemKey, Now, error::ApiError};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing,
};
use serde::Serialize;
use sga_cache::{OpState, RateLimit};
use sga_core::models::{
    Auction, AuctionId, AuctionListing, AuctionSummary, JobKind, JobRecord, RawAuctionDto, UserId,
};
use sga_core::ports::AuctionStore;
use time::OffsetDateTime;
use tracing::{Level, event};
use utoipa::ToSchema;

pub fn router<T: AuctionStore>() -> Router<AppState<T>> {
    Router::new()
        .route(
            "/",
            routing::get(list_auctions).post(create_auction),
        )
        .route("/{auction_id}", routing::get(get_auction))
        .route(
            "/{auction_id}/bids",
            routing::get(bids::list_bids).post(bids::place_bid),
        )
        .route("/{auction_id}/bids/me", routing::get(bids::my_bid))
}

#[derive(Serialize, ToSchema)]
pub struct CreateAuctionResponse {
    success: bool,
    /// True when this response was replayed from the idempotency slot
    idempotent: bool,
    auction: AuctionSummary,
}

#[utoipa::path(
    post,
    path = "/v0/auctions",
    request_body = RawAuctionDto,
    responses(
        (status = OK, body = CreateAuctionResponse),
        (status = UNAUTHORIZED),
        (status = BAD_REQUEST),
        (status = CONFLICT),
        (status = TOO_MANY_REQUESTS)
    ),
    tags = ["auctions"]
)]
/// Create an auction, committing the prize gifts from the caller's holding.
pub async fn create_auction<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Now(now): Now,
    // Key-format validation first, as on the bid path.
    IdemKey(key): IdemKey,
    Caller(author_id): Caller,
    Json(dto): Json<RawAuctionDto>,
) -> Result<Json<CreateAuctionResponse>, ApiError> {
    state.limiter.check(
        "create-auction",
        author_id,
        RateLimit::per_minute(state.config.create_per_minute),
    )?;

    // The idempotency slot bridges the gift debit, the document insert and
    // the job enqueue: one execution, however many retries.
    match state.ops.begin(key.as_str(), now) {
        OpState::InFlight | OpState::Failed => Err(ApiError::IdempotencyConflict),
        OpState::Done(payload) => {
            let auction_id: AuctionId = payload
                .parse()
                .map_err(|_| ApiError::internal("corrupt idempotency payload"))?;
            let auction = state
                .store
                .get_auction(auction_id)
                .await
                .map_err(ApiError::internal)?
                .ok_or_else(|| ApiError::internal("replayed auction is missing"))?;
            Ok(Json(CreateAuctionResponse {
                success: true,
                idempotent: true,
                auction: (&auction).into(),
            }))
        }
        OpState::Begun => {
            let result = run_create(&state, author_id, &key.to_string(), dto, now).await;
            match result {
                Ok(auction) => {
                    state
                        .ops
                        .complete(key.as_str(), auction.auction_id.to_string(), now);
                    Ok(Json(CreateAuctionResponse {
                        success: true,
                        idempotent: false,
                        auction: (&auction).into(),
                    }))
                }
                Err(CreateFailure::Recoverable(error)) => {
                    // Nothing happened yet; the caller may retry with the
                    // same key.
                    state.ops.release(key.as_str());
                    Err(error)
                }
                Err(CreateFailure::AfterSideEffects(error)) => {
                    // Compensations ran, but the key has seen side effects
                    // and must never be reused.
                    state.ops.fail(key.as_str(), now);
                    Err(error)
                }
            }
        }
    }
}

enum CreateFailure {
    Recoverable(ApiError),
    AfterSideEffects(ApiError),
}

async fn run_create<T: AuctionStore>(
    state: &AppState<T>,
    author_id: UserId,
    key: &str,
    dto: RawAuctionDto,
    now: OffsetDateTime,
) -> Result<Auction, CreateFailure> {
    let auction = dto
        .into_auction(AuctionId::generate(), author_id, now)
        .map_err(|error| CreateFailure::Recoverable(error.into()))?;

    state
        .store
        .ensure_user(author_id)
        .await
        .map_err(|e| CreateFailure::Recoverable(ApiError::internal(e)))?;

    // Reserve the prize gifts under the author's lock.
    let debited = state
        .locks
        .with_lock(author_id, async || {
            state
                .store
                .debit_gifts(author_id, &auction.gift_name, auction.gift_count)
                .await
        })
        .await
        .map_err(|e| CreateFailure::Recoverable(e.into()))?
        .map_err(|e| CreateFailure::Recoverable(ApiError::internal(e)))?;
    if debited.is_err() {
        return Err(CreateFailure::Recoverable(ApiError::InsufficientGifts));
    }

    // Side effects have begun; any failure from here on compensates.
    match finish_create(state, &auction).await {
        Ok(()) => {
            event!(
                Level::INFO,
                auction_id = %auction.auction_id,
                %author_id,
                key,
                "auction created"
            );
            Ok(auction)
        }
        Err(error) => {
            event!(
                Level::ERROR,
                auction_id = %auction.auction_id,
                %error,
                "auction creation failed after the gift debit; compensating"
            );
            undo_create(state, &auction).await;
            Err(CreateFailure::AfterSideEffects(ApiError::Internal))
        }
    }
}

async fn finish_create<T: AuctionStore>(
    state: &AppState<T>,
    auction: &Auction,
) -> Result<(), T::Error> {
    if !state.store.create_auction(auction).await? {
        // Ids are random v4s; a collision here means a replayed insert.
        event!(Level::WARN, auction_id = %auction.auction_id, "auction id already present");
    }
    state
        .store
        .schedule_job(&JobRecord::new(
            JobKind::StartRound {
                auction_id: auction.auction_id,
                round: 0,
            },
            auction.start_time,
        ))
        .await?;
    Ok(())
}

async fn undo_create<T: AuctionStore>(state: &AppState<T>, auction: &Auction) {
    let start_job = JobKind::StartRound {
        auction_id: auction.auction_id,
        round: 0,
    }
    .job_id();
    if let Err(error) = state.store.cancel_job(&start_job).await {
        event!(Level::ERROR, %error, "failed to cancel the start job");
    }
    if let Err(error) = state.store.delete_auction(auction.auction_id).await {
        event!(Level::ERROR, %error, "failed to delete the auction document");
    }
    if let Err(error) = state
        .store
        .credit_gifts(auction.author_id, &auction.gift_name, auction.gift_count)
        .await
    {
        event!(Level::ERROR, %error, "failed to return the reserved gifts");
    }
}

#[utoipa::path(
    get,
    path = "/v0/auctions",
    responses((status = OK, body = Vec<AuctionListing>)),
    tags = ["auctions"]
)]
/// Every pending or running auction, with live participant counts.
pub async fn list_auctions<T: AuctionStore>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<AuctionListing>>, ApiError> {
    let auctions = state
        .store
        .list_open_auctions()
        .await
        .map_err(ApiError::internal)?;
    let listings = auctions
        .iter()
        .map(|auction| AuctionListing {
            auction: auction.into(),
            participants: state.board.participants(auction.auction_id),
        })
        .collect();
    Ok(Json(listings))
}

#[derive(Serialize, ToSchema)]
pub struct AuctionDetailResponse {
    auction: AuctionSummary,
    participants_count: u64,
}

#[utoipa::path(
    get,
    path = "/v0/auctions/{auction_id}",
    params(("auction_id" = String, Path, description = "Auction to fetch")),
    responses(
        (status = OK, body = AuctionDetailResponse),
        (status = NOT_FOUND)
    ),
    tags = ["auctions"]
)]
/// One auction with its live participant count.
pub async fn get_auction<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Path(auction_id): Path<String>,
) -> Result<Json<AuctionDetailResponse>, ApiError> {
    let auction_id: AuctionId = auction_id.parse().map_err(|_| ApiError::InvalidAuctionId)?;
    let auction = state
        .store
        .get_auction(auction_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuctionNotFound)?;

    Ok(Json(AuctionDetailResponse {
        auction: (&auction).into(),
        participants_count: state.board.participants(auction_id),
    }))
}
