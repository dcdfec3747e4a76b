use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use sga_core::models::CreateAuctionError;
use serde::Serialize;
use thiserror::Error;

/// Every way a request can fail, carrying the stable error code clients
/// dispatch on.
///
/// Subsystems return typed outcomes; this is the single place they are
/// mapped to status codes and JSON bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller-id header is missing or malformed
    #[error("user not provided")]
    UserNotProvided,
    /// The idempotency key header is missing or malformed
    #[error("invalid idempotency key")]
    InvalidIdempotencyKey,
    /// The auction id is not a valid id
    #[error("invalid auction id")]
    InvalidAuctionId,
    /// The stars amount is not a positive integer
    #[error("invalid stars amount")]
    InvalidStarsAmount,
    /// No auction with the given id
    #[error("auction not found")]
    AuctionNotFound,
    /// The auction is not accepting bids
    #[error("auction not active")]
    AuctionNotActive,
    /// Authors cannot bid on their own auctions
    #[error("cannot bet on own auction")]
    CannotBetOwnAuction,
    /// The available balance cannot cover the bid
    #[error("insufficient balance")]
    InsufficientBalance,
    /// Bids never decrease while an auction is active
    #[error("cannot decrease bid")]
    CannotDecrease,
    /// The author owns fewer gifts than the auction commits
    #[error("insufficient gifts")]
    InsufficientGifts,
    /// Invalid field in a create-auction request
    #[error("invalid auction: {0}")]
    InvalidAuction(#[from] CreateAuctionError),
    /// The idempotency key is attached to an operation that is still
    /// running or that failed after side effects began
    #[error("idempotency conflict")]
    IdempotencyConflict,
    /// A rate limit or the user-lock budget was exceeded
    #[error("too many requests")]
    TooManyRequests {
        /// Seconds the client should wait before retrying
        retry_after_secs: u64,
        /// The budget that was exceeded, when known
        limit: Option<u32>,
    },
    /// Store failure; the caller may retry with the same key
    #[error("internal error")]
    Internal,
}

impl ApiError {
    /// Log a store error and collapse it into the opaque 500.
    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        tracing::error!(%error, "request failed on a store error");
        Self::Internal
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::UserNotProvided => StatusCode::UNAUTHORIZED,
            Self::AuctionNotFound => StatusCode::NOT_FOUND,
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::UserNotProvided => "USER_NOT_PROVIDED",
            Self::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            Self::InvalidAuctionId => "INVALID_AUCTION_ID",
            Self::InvalidStarsAmount => "INVALID_STARS_AMOUNT",
            Self::AuctionNotFound => "AUCTION_NOT_FOUND",
            Self::AuctionNotActive => "AUCTION_NOT_ACTIVE",
            Self::CannotBetOwnAuction => "CANNOT_BET_OWN_AUCTION",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::CannotDecrease => "CANNOT_DECREASE",
            Self::InsufficientGifts => "INSUFFICIENT_GIFTS",
            Self::InvalidAuction(err) => match err {
                CreateAuctionError::InvalidName => "INVALID_NAME",
                CreateAuctionError::InvalidGift => "INVALID_GIFT",
                CreateAuctionError::InvalidStartTime => "INVALID_START_TIME",
                CreateAuctionError::InvalidRounds => "INVALID_ROUNDS",
                CreateAuctionError::PrizeMismatch => "INVALID_GIFT_COUNT",
            },
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.code(),
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let Self::TooManyRequests {
            retry_after_secs,
            limit,
        } = self
        {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
            if let Some(limit) = limit {
                if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                    headers.insert("x-ratelimit-limit", value);
                }
                headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            }
        }

        response
    }
}

impl From<sga_cache::RateExceeded> for ApiError {
    fn from(value: sga_cache::RateExceeded) -> Self {
        Self::TooManyRequests {
            retry_after_secs: value.retry_after_secs,
            limit: Some(value.limit),
        }
    }
}

impl From<sga_cache::LockTimeout> for ApiError {
    fn from(_: sga_cache::LockTimeout) -> Self {
        // A lock that never freed up is a liveness problem, not a
        // correctness one; tell the client to back off and retry.
        Self::TooManyRequests {
            retry_after_secs: 1,
            limit: None,
        }
    }
}
