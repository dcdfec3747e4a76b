use crate::error::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use sga_core::models::{IdempotencyKey, UserId};
use time::OffsetDateTime;

/// A wrapper for the current time in UTC.
///
/// Handlers take the timestamp once, up front, so every decision inside a
/// request observes the same instant.
pub struct Now(pub OffsetDateTime);

impl<S> FromRequestParts<S> for Now
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(_: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        Ok(Now(OffsetDateTime::now_utc()))
    }
}

/// The caller's identity, taken on trust from the `x-user-id` header.
///
/// Authentication is an upstream concern: by the time a request reaches
/// this service, a gateway has already established who is calling.
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::UserNotProvided)?;
        let user_id = header.parse().map_err(|_| ApiError::UserNotProvided)?;
        Ok(Self(user_id))
    }
}

/// The caller's validated idempotency key from the `idempotency-key`
/// header. Mandatory on every mutating operation.
pub struct IdemKey(pub IdempotencyKey);

impl<S> FromRequestParts<S> for IdemKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("idempotency-key")
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::InvalidIdempotencyKey)?;
        let key = header
            .parse()
            .map_err(|_| ApiError::InvalidIdempotencyKey)?;
        Ok(Self(key))
    }
}
