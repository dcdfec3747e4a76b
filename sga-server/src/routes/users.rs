use crate::{AppState, Caller, error::ApiError};
use axum::{
    Json, Router,
    extract::{Query, State},
    routing,
};
use serde::{Deserialize, Serialize};
use sga_cache::RateLimit;
use sga_core::models::{GiftHolding, TransactionRecord, UserAccount};
use sga_core::ports::AuctionStore;
use time::OffsetDateTime;
use utoipa::ToSchema;

pub fn router<T: AuctionStore>() -> Router<AppState<T>> {
    Router::new()
        .route("/me", routing::get(get_profile))
        .route("/me/balance", routing::get(get_balance))
        .route("/me/transactions", routing::get(list_transactions))
}

#[utoipa::path(
    get,
    path = "/v0/users/me",
    responses(
        (status = OK, body = UserAccount),
        (status = UNAUTHORIZED),
        (status = TOO_MANY_REQUESTS)
    ),
    tags = ["users"]
)]
/// The caller's account: balance and gift holdings.
pub async fn get_profile<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Caller(user_id): Caller,
) -> Result<Json<UserAccount>, ApiError> {
    state.limiter.check(
        "read",
        user_id,
        RateLimit::per_second(state.config.read_per_second),
    )?;

    let account = state
        .store
        .get_user(user_id)
        .await
        .map_err(ApiError::internal)?
        .unwrap_or(UserAccount {
            user_id,
            balance: 0,
            gifts: Vec::<GiftHolding>::new(),
            created_at: OffsetDateTime::now_utc(),
        });
    Ok(Json(account))
}

#[derive(Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Total stars owned
    balance: i64,
    /// Stars free to be locked by a new bid
    available: i64,
    /// Stars locked behind active bids, derived from the ledger
    locked: i64,
}

#[utoipa::path(
    get,
    path = "/v0/users/me/balance",
    responses(
        (status = OK, body = BalanceResponse),
        (status = UNAUTHORIZED),
        (status = TOO_MANY_REQUESTS)
    ),
    tags = ["users"]
)]
/// The caller's balance split into available and locked.
pub async fn get_balance<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Caller(user_id): Caller,
) -> Result<Json<BalanceResponse>, ApiError> {
    state.limiter.check(
        "read",
        user_id,
        RateLimit::per_second(state.config.read_per_second),
    )?;

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

    Ok(Json(BalanceResponse {
        balance,
        available: balance - locked,
        locked,
    }))
}

#[derive(Deserialize)]
pub struct FeedParams {
    limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/v0/users/me/transactions",
    responses(
        (status = OK, body = Vec<TransactionRecord>),
        (status = UNAUTHORIZED),
        (status = TOO_MANY_REQUESTS)
    ),
    tags = ["users"]
)]
/// The caller's raw transaction feed, newest first.
pub async fn list_transactions<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Caller(user_id): Caller,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    state.limiter.check(
        "read",
        user_id,
        RateLimit::per_second(state.config.read_per_second),
    )?;

    let limit = params.limit.unwrap_or(50).min(200);
    let feed = state
        .store
        .transactions_for_user(user_id, limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(feed))
}
