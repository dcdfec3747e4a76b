use crate::{AppState, Caller, error::ApiError};
use axum::{Json, Router, extract::State, routing};
use serde::{Deserialize, Serialize};
use sga_core::ports::AuctionStore;

pub fn router<T: AuctionStore>() -> Router<AppState<T>> {
    Router::new().route("/topup", routing::post(topup))
}

#[derive(Deserialize)]
pub struct TopupDto {
    #[serde(default)]
    stars: i64,
    gift_name: Option<String>,
    #[serde(default)]
    gift_count: i64,
}

#[derive(Serialize)]
pub struct TopupResponse {
    success: bool,
    balance: i64,
}

/// Mint stars and/or gifts for the caller. Only mounted when the server
/// runs with `testmode` on; harnesses use it to seed scenario accounts.
pub async fn topup<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Caller(user_id): Caller,
    Json(dto): Json<TopupDto>,
) -> Result<Json<TopupResponse>, ApiError> {
    state
        .store
        .ensure_user(user_id)
        .await
        .map_err(ApiError::internal)?;

    if dto.stars > 0 {
        state
            .store
            .credit_stars(user_id, dto.stars)
            .await
            .map_err(ApiError::internal)?;
    }
    if let Some(gift_name) = dto.gift_name {
        if dto.gift_count > 0 {
            state
                .store
                .credit_gifts(user_id, &gift_name, dto.gift_count)
                .await
                .map_err(ApiError::internal)?;
        }
    }

    let balance = state
        .store
        .get_user(user_id)
        .await
        .map_err(ApiError::internal)?
        .map(|account| account.balance)
        .unwrap_or(0);

    Ok(Json(TopupResponse {
        success: true,
        balance,
    }))
}
