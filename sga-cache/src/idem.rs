use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fxhash::FxBuildHasher;
use time::{Duration, OffsetDateTime};

const OP_TTL: Duration = Duration::hours(24);

/// Where an idempotent multi-step operation currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpState {
    /// This caller owns the key and may proceed
    Begun,
    /// Another request with this key is still executing
    InFlight,
    /// The operation completed; replay this payload
    Done(String),
    /// The operation started side effects and did not complete cleanly;
    /// the key is burnt and the caller must pick a new one
    Failed,
}

#[derive(Clone, Debug)]
enum SlotState {
    InFlight,
    Done(String),
    Failed,
}

struct Slot {
    state: SlotState,
    expires_at: OffsetDateTime,
}

/// Idempotency slots for multi-step operations (auction creation).
///
/// The bid path stores its outcomes inside the board's admission lock; this
/// cache covers operations whose side effects span several stores and
/// therefore need an explicit in-flight marker: a concurrent duplicate sees
/// [`OpState::InFlight`] and is answered with a conflict instead of a
/// second execution.
#[derive(Default)]
pub struct OpCache {
    slots: DashMap<String, Slot, FxBuildHasher>,
}

impl OpCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key, or report what already happened under it.
    pub fn begin(&self, key: &str, now: OffsetDateTime) -> OpState {
        match self.slots.entry(key.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    state: SlotState::InFlight,
                    expires_at: now + OP_TTL,
                });
                OpState::Begun
            }
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    entry.insert(Slot {
                        state: SlotState::InFlight,
                        expires_at: now + OP_TTL,
                    });
                    return OpState::Begun;
                }
                match &entry.get().state {
                    SlotState::InFlight => OpState::InFlight,
                    SlotState::Done(payload) => OpState::Done(payload.clone()),
                    SlotState::Failed => OpState::Failed,
                }
            }
        }
    }

    /// Store the completed outcome for replay.
    pub fn complete(&self, key: &str, payload: String, now: OffsetDateTime) {
        self.slots.insert(
            key.to_owned(),
            Slot {
                state: SlotState::Done(payload),
                expires_at: now + OP_TTL,
            },
        );
    }

    /// Burn the key: side effects began and were compensated, but the key
    /// must not be reused.
    pub fn fail(&self, key: &str, now: OffsetDateTime) {
        self.slots.insert(
            key.to_owned(),
            Slot {
                state: SlotState::Failed,
                expires_at: now + OP_TTL,
            },
        );
    }

    /// Free the key after a recoverable validation failure (no side effects
    /// happened, the caller may retry with the same key).
    pub fn release(&self, key: &str) {
        self.slots.remove(key);
    }
}
