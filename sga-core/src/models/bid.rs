use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Largest first-bid timestamp (in seconds) the composite score can carry.
///
/// `MAX_TS < 10^10`, so the bid amount is losslessly recoverable from the
/// score as `score / 10^10` and the first-bid timestamp as
/// `MAX_TS - score % 10^10`.
pub const MAX_TS: i64 = 9_999_999_999;

const SCORE_BASE: u128 = 10_000_000_000;

/// Composite ranking score: higher amounts first, earlier first bids first.
///
/// `score = amount * 10^10 + (MAX_TS - first_bid_ts_secs)`. Two bidders can
/// only collide on the full score if they share both the amount and the
/// first-bid second; the ranked set breaks that residual tie by user id.
pub fn bid_score(amount: i64, first_bid_ts_secs: i64) -> u128 {
    debug_assert!(amount > 0);
    debug_assert!((0..=MAX_TS).contains(&first_bid_ts_secs));
    amount as u128 * SCORE_BASE + (MAX_TS - first_bid_ts_secs) as u128
}

/// Recover the bid amount from a composite score.
pub fn score_amount(score: u128) -> i64 {
    (score / SCORE_BASE) as i64
}

/// Recover the first-bid timestamp (seconds) from a composite score.
///
/// Raising a bid re-derives this value from the existing score so the
/// original admission time survives any number of increases.
pub fn score_first_bid_ts(score: u128) -> i64 {
    MAX_TS - (score % SCORE_BASE) as i64
}

/// The decision produced by one execution of the bid admission script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BidOutcome {
    /// The bid was admitted (first bid or an increase)
    Ok {
        /// The new current bid
        bet: i64,
        /// The previous current bid (0 for a first bid)
        previous_bet: i64,
        /// Stars newly locked by this request, `bet - previous_bet`
        charged: i64,
    },
    /// The requested amount equals the current bid; nothing changed
    Same {
        /// The unchanged current bid
        bet: i64,
    },
    /// The requested amount is below the current bid
    CannotDecrease {
        /// The current bid the request tried to undercut
        current: i64,
    },
    /// The user's available balance cannot cover the increase
    InsufficientBalance {
        /// Available balance at decision time, including the current bid
        available: i64,
    },
}

/// A [`BidOutcome`] together with the idempotent-replay marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidPlacement {
    /// What the script decided
    pub outcome: BidOutcome,
    /// True when the outcome was replayed from the idempotency slot
    pub idempotent: bool,
}

/// The cacheable subset of [`BidOutcome`], as stored in an idempotency slot.
///
/// Only OK and SAME outcomes are ever cached; validation errors stay
/// recoverable and must not consume the slot. The wire form is a single
/// opaque string `CODE:bet:previous_bet:charged`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredOutcome {
    /// True for OK, false for SAME
    pub admitted: bool,
    /// The current bid after the request
    pub bet: i64,
    /// The bid before the request
    pub previous_bet: i64,
    /// Stars charged by the request (0 for SAME)
    pub charged: i64,
}

impl StoredOutcome {
    /// The slot representation of a cacheable outcome, if it is one.
    pub fn from_outcome(outcome: &BidOutcome) -> Option<Self> {
        match *outcome {
            BidOutcome::Ok {
                bet,
                previous_bet,
                charged,
            } => Some(Self {
                admitted: true,
                bet,
                previous_bet,
                charged,
            }),
            BidOutcome::Same { bet } => Some(Self {
                admitted: false,
                bet,
                previous_bet: bet,
                charged: 0,
            }),
            _ => None,
        }
    }

    /// Rehydrate the outcome a replayed request should observe.
    pub fn into_outcome(self) -> BidOutcome {
        if self.admitted {
            BidOutcome::Ok {
                bet: self.bet,
                previous_bet: self.previous_bet,
                charged: self.charged,
            }
        } else {
            BidOutcome::Same { bet: self.bet }
        }
    }
}

impl std::fmt::Display for StoredOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = if self.admitted { "OK" } else { "SAME" };
        write!(f, "{code}:{}:{}:{}", self.bet, self.previous_bet, self.charged)
    }
}

impl std::str::FromStr for StoredOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let code = parts.next().ok_or("empty slot")?;
        let admitted = match code {
            "OK" => true,
            "SAME" => false,
            other => return Err(format!("unknown outcome code: {other}")),
        };
        let mut field = || -> Result<i64, String> {
            parts
                .next()
                .ok_or("truncated slot")?
                .parse()
                .map_err(|e| format!("bad slot field: {e}"))
        };
        let bet = field()?;
        let previous_bet = field()?;
        let charged = field()?;
        if parts.next().is_some() {
            return Err("trailing slot data".into());
        }
        Ok(Self {
            admitted,
            bet,
            previous_bet,
            charged,
        })
    }
}

/// The caller-supplied idempotency key format is invalid.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("idempotency key must be 8-64 characters of [A-Za-z0-9_-]")]
pub struct InvalidIdempotencyKey;

/// A validated caller-supplied idempotency key.
///
/// 8 to 64 characters from `[A-Za-z0-9_-]`, required on every mutating
/// operation. Stored outcomes keyed by it live for 24 hours.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for IdempotencyKey {
    type Err = InvalidIdempotencyKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ok_len = (8..=64).contains(&s.len());
        let ok_chars = s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if ok_len && ok_chars {
            Ok(Self(s.to_owned()))
        } else {
            Err(InvalidIdempotencyKey)
        }
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = InvalidIdempotencyKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdempotencyKey> for String {
    fn from(value: IdempotencyKey) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_round_trips_amount_and_timestamp() {
        let score = bid_score(200, 1_700_000_123);
        assert_eq!(score_amount(score), 200);
        assert_eq!(score_first_bid_ts(score), 1_700_000_123);
    }

    #[test]
    fn higher_amount_always_outranks() {
        // A later, larger bid beats an earlier, smaller one.
        assert!(bid_score(201, MAX_TS) > bid_score(200, 0));
    }

    #[test]
    fn equal_amounts_rank_earlier_bid_higher() {
        let earlier = bid_score(200, 1_000);
        let later = bid_score(200, 1_001);
        assert!(earlier > later);
    }

    #[test]
    fn stored_outcome_wire_round_trip() {
        let stored = StoredOutcome {
            admitted: true,
            bet: 250,
            previous_bet: 100,
            charged: 150,
        };
        let parsed: StoredOutcome = stored.to_string().parse().unwrap();
        assert_eq!(parsed, stored);

        let same = StoredOutcome::from_outcome(&BidOutcome::Same { bet: 42 }).unwrap();
        let parsed: StoredOutcome = same.to_string().parse().unwrap();
        assert_eq!(parsed.into_outcome(), BidOutcome::Same { bet: 42 });
    }

    #[test]
    fn validation_errors_are_not_cacheable() {
        assert!(StoredOutcome::from_outcome(&BidOutcome::CannotDecrease { current: 10 }).is_none());
        assert!(
            StoredOutcome::from_outcome(&BidOutcome::InsufficientBalance { available: 1 })
                .is_none()
        );
    }

    #[test]
    fn idempotency_key_format() {
        assert!("abcd1234".parse::<IdempotencyKey>().is_ok());
        assert!("A-b_C-d_E-f_G-h".parse::<IdempotencyKey>().is_ok());
        assert!("short".parse::<IdempotencyKey>().is_err());
        assert!("has space".parse::<IdempotencyKey>().is_err());
        assert!("x".repeat(65).parse::<IdempotencyKey>().is_err());
        assert!("x".repeat(64).parse::<IdempotencyKey>().is_ok());
    }
}
