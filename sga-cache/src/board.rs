use fxhash::FxHashMap;
use sga_core::models::{
    AuctionId, BidOutcome, BidPlacement, IdempotencyKey, MAX_TS, StoredOutcome, UserId, bid_score,
    score_amount, score_first_bid_ts,
};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

/// How long a stored bid outcome can be replayed.
const SLOT_TTL: Duration = Duration::hours(24);

#[derive(Default)]
struct Ranking {
    scores: FxHashMap<UserId, u128>,
    // Iterates highest score first; the UserId component only breaks the
    // residual same-amount-same-second tie.
    ordered: BTreeSet<(Reverse<u128>, UserId)>,
}

struct Slot {
    outcome: StoredOutcome,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct BoardState {
    user_bids: FxHashMap<UserId, FxHashMap<AuctionId, i64>>,
    rankings: FxHashMap<AuctionId, Ranking>,
    slots: FxHashMap<String, Slot>,
}

/// The three-key bid cache: per-user bid maps, per-auction rankings and the
/// idempotency slots, all behind one mutex.
///
/// Holding a single lock across the whole admission decision replicates the
/// fast store's script semantics: either every key reflects the outcome or
/// none does, and concurrent admissions for distinct users serialize here.
/// Same-user concurrency is additionally serialized by the per-user mutex
/// around the balance read.
#[derive(Default)]
pub struct BidBoard {
    inner: Mutex<BoardState>,
}

impl BidBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the bid admission decision.
    ///
    /// `available_balance` is `balance - locked` computed from the ledger
    /// under the caller's user mutex. The decision table, in order: replay a
    /// live idempotency slot; SAME when the amount equals the current bid;
    /// CANNOT_DECREASE below it; INSUFFICIENT_BALANCE when
    /// `available + current < amount`; otherwise admit. Only OK and SAME
    /// consume the slot.
    pub fn place(
        &self,
        user_id: UserId,
        auction_id: AuctionId,
        amount: i64,
        key: &IdempotencyKey,
        available_balance: i64,
        now: OffsetDateTime,
    ) -> BidPlacement {
        let mut guard = self.inner.lock().unwrap();
        let state = &mut *guard;

        // A live slot replays verbatim; an expired one is overwritten below
        // if this request caches again.
        if let Some(slot) = state.slots.get(key.as_str()) {
            if slot.expires_at > now {
                return BidPlacement {
                    outcome: slot.outcome.into_outcome(),
                    idempotent: true,
                };
            }
        }

        let current = state
            .user_bids
            .get(&user_id)
            .and_then(|bids| bids.get(&auction_id))
            .copied()
            .unwrap_or(0);

        if current == amount {
            let outcome = BidOutcome::Same { bet: amount };
            store_slot(state, key, &outcome, now);
            return BidPlacement {
                outcome,
                idempotent: false,
            };
        }

        if amount < current {
            return BidPlacement {
                outcome: BidOutcome::CannotDecrease { current },
                idempotent: false,
            };
        }

        // The user's current bid is already locked, so raising it only has
        // to cover the difference.
        let actual_available = available_balance + current;
        if actual_available < amount {
            return BidPlacement {
                outcome: BidOutcome::InsufficientBalance {
                    available: actual_available,
                },
                idempotent: false,
            };
        }

        let ranking = state.rankings.entry(auction_id).or_default();
        let first_bid_ts = match ranking.scores.get(&user_id) {
            // An increase keeps the original admission second, so raising a
            // bid never leapfrogs an earlier bidder of the same amount.
            Some(old) => {
                ranking.ordered.remove(&(Reverse(*old), user_id));
                score_first_bid_ts(*old)
            }
            None => now.unix_timestamp().clamp(0, MAX_TS),
        };
        let score = bid_score(amount, first_bid_ts);
        ranking.scores.insert(user_id, score);
        ranking.ordered.insert((Reverse(score), user_id));

        state
            .user_bids
            .entry(user_id)
            .or_default()
            .insert(auction_id, amount);

        let outcome = BidOutcome::Ok {
            bet: amount,
            previous_bet: current,
            charged: amount - current,
        };
        store_slot(state, key, &outcome, now);

        BidPlacement {
            outcome,
            idempotent: false,
        }
    }

    /// The user's current bid in an auction, if any.
    pub fn current_bid(&self, user_id: UserId, auction_id: AuctionId) -> Option<i64> {
        let state = self.inner.lock().unwrap();
        state
            .user_bids
            .get(&user_id)
            .and_then(|bids| bids.get(&auction_id))
            .copied()
    }

    /// The top `n` bidders of an auction in rank order.
    pub fn top_bidders(&self, auction_id: AuctionId, n: usize) -> Vec<(UserId, i64)> {
        let state = self.inner.lock().unwrap();
        let Some(ranking) = state.rankings.get(&auction_id) else {
            return Vec::new();
        };
        ranking
            .ordered
            .iter()
            .take(n)
            .map(|(Reverse(score), user_id)| (*user_id, score_amount(*score)))
            .collect()
    }

    /// Whether the user currently ranks within the top `n`.
    pub fn is_in_top(&self, auction_id: AuctionId, user_id: UserId, n: usize) -> bool {
        self.top_bidders(auction_id, n)
            .iter()
            .any(|(u, _)| *u == user_id)
    }

    /// The user's 1-based rank and the total participant count.
    pub fn rank_of(&self, auction_id: AuctionId, user_id: UserId) -> Option<(u64, u64)> {
        let state = self.inner.lock().unwrap();
        let ranking = state.rankings.get(&auction_id)?;
        let total = ranking.ordered.len() as u64;
        ranking
            .ordered
            .iter()
            .position(|(_, u)| *u == user_id)
            .map(|idx| (idx as u64 + 1, total))
    }

    /// Live bidder count of an auction.
    pub fn participants(&self, auction_id: AuctionId) -> u64 {
        let state = self.inner.lock().unwrap();
        state
            .rankings
            .get(&auction_id)
            .map(|r| r.ordered.len() as u64)
            .unwrap_or(0)
    }

    /// Every bidder currently in the auction's ranking, rank order.
    pub fn bidders(&self, auction_id: AuctionId) -> Vec<UserId> {
        let state = self.inner.lock().unwrap();
        state
            .rankings
            .get(&auction_id)
            .map(|r| r.ordered.iter().map(|(_, u)| *u).collect())
            .unwrap_or_default()
    }

    /// Drop one user's bid from an auction (settled winners). Idempotent.
    pub fn remove_bid(&self, auction_id: AuctionId, user_id: UserId) {
        let mut guard = self.inner.lock().unwrap();
        let state = &mut *guard;
        if let Some(ranking) = state.rankings.get_mut(&auction_id) {
            if let Some(score) = ranking.scores.remove(&user_id) {
                ranking.ordered.remove(&(Reverse(score), user_id));
            }
        }
        if let Some(bids) = state.user_bids.get_mut(&user_id) {
            bids.remove(&auction_id);
            if bids.is_empty() {
                state.user_bids.remove(&user_id);
            }
        }
    }

    /// Drop the auction's ranking and every per-user entry for it
    /// (finish-time clear). Idempotent.
    pub fn clear_auction(&self, auction_id: AuctionId) {
        let mut guard = self.inner.lock().unwrap();
        let state = &mut *guard;
        let users: Vec<UserId> = state
            .rankings
            .remove(&auction_id)
            .map(|r| r.scores.into_keys().collect())
            .unwrap_or_default();
        for user_id in users {
            if let Some(bids) = state.user_bids.get_mut(&user_id) {
                bids.remove(&auction_id);
                if bids.is_empty() {
                    state.user_bids.remove(&user_id);
                }
            }
        }
    }

    /// Drop idempotency slots past their TTL.
    pub fn purge_expired_slots(&self, now: OffsetDateTime) {
        let mut state = self.inner.lock().unwrap();
        state.slots.retain(|_, slot| slot.expires_at > now);
    }
}

fn store_slot(state: &mut BoardState, key: &IdempotencyKey, outcome: &BidOutcome, now: OffsetDateTime) {
    if let Some(stored) = StoredOutcome::from_outcome(outcome) {
        state.slots.insert(
            key.as_str().to_owned(),
            Slot {
                outcome: stored,
                expires_at: now + SLOT_TTL,
            },
        );
    }
}
