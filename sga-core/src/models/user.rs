use super::UserId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// A named stack of fungible gifts owned by a user.
///
/// Gift names are unique per user; `count` never goes negative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GiftHolding {
    /// Display name of the gift, e.g. `"Diamond"`
    pub name: String,
    /// How many of this gift the user owns
    pub count: i64,
}

/// A user account as stored in the durable store.
///
/// Users are created on first reference and never deleted. `balance` is the
/// total number of stars the user owns, locked and available alike; the
/// locked portion is always derived from the transaction ledger, never
/// stored here.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UserAccount {
    /// Stable user id
    pub user_id: UserId,
    /// Total stars owned (available + locked)
    pub balance: i64,
    /// Gifts owned by this user
    pub gifts: Vec<GiftHolding>,
    /// When the account was first referenced
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub created_at: OffsetDateTime,
}

impl UserAccount {
    /// The number of a specific gift the user owns (0 when absent).
    pub fn gift_count(&self, name: &str) -> i64 {
        self.gifts
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.count)
            .unwrap_or(0)
    }
}
