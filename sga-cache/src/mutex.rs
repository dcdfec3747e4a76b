use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fxhash::FxBuildHasher;
use rand::Rng as _;
use sga_core::models::UserId;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The lock could not be acquired within the retry budget.
///
/// Surfaces to the client as a transient too-many-requests condition: a
/// liveness hint, not a correctness one.
#[derive(Clone, Copy, Debug, Error)]
#[error("user lock acquisition timed out")]
pub struct LockTimeout;

/// Tunables of the per-user mutex.
#[derive(Clone, Copy, Debug)]
pub struct LockConfig {
    /// Dead-holder cap: a slot older than this is considered abandoned
    pub ttl: Duration,
    /// Base delay between acquisition attempts
    pub retry_delay: Duration,
    /// Upper bound of the random extra delay added to each retry
    pub max_jitter: Duration,
    /// How many attempts before giving up (~15 s total at the defaults)
    pub max_attempts: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            retry_delay: Duration::from_millis(20),
            max_jitter: Duration::from_millis(20),
            max_attempts: 500,
        }
    }
}

struct LockSlot {
    token: u64,
    expires_at: Instant,
}

/// A distributed-mutex-shaped lock table, one slot per user id.
///
/// Acquisition is set-if-absent with a TTL; release is conditional on the
/// owner token so a slow holder whose slot expired cannot delete a
/// successor's lock. Every balance-affecting operation on behalf of a user
/// runs under this lock.
#[derive(Default)]
pub struct UserLocks {
    slots: DashMap<UserId, LockSlot, FxBuildHasher>,
    config: LockConfig,
}

impl UserLocks {
    /// A lock table with default tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// A lock table with explicit tuning (tests shrink the retry budget).
    pub fn with_config(config: LockConfig) -> Self {
        Self {
            slots: DashMap::default(),
            config,
        }
    }

    fn try_acquire(&self, user_id: UserId) -> Option<u64> {
        let token = rand::rng().random::<u64>();
        let now = Instant::now();
        match self.slots.entry(user_id) {
            Entry::Vacant(entry) => {
                entry.insert(LockSlot {
                    token,
                    expires_at: now + self.config.ttl,
                });
                Some(token)
            }
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    entry.insert(LockSlot {
                        token,
                        expires_at: now + self.config.ttl,
                    });
                    Some(token)
                } else {
                    None
                }
            }
        }
    }

    /// Acquire the user's lock, retrying with jitter up to the budget.
    pub async fn acquire(&self, user_id: UserId) -> Result<UserGuard<'_>, LockTimeout> {
        for attempt in 0..self.config.max_attempts {
            if let Some(token) = self.try_acquire(user_id) {
                return Ok(UserGuard {
                    locks: self,
                    user_id,
                    token,
                });
            }
            if attempt + 1 == self.config.max_attempts {
                break;
            }
            let jitter_ms = self.config.max_jitter.as_millis() as u64;
            let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
            tokio::time::sleep(self.config.retry_delay + jitter).await;
        }
        Err(LockTimeout)
    }

    /// Acquire, run `body`, release.
    ///
    /// The lock must not be held across unrelated I/O; keep `body` to the
    /// balance read plus the admission call it protects.
    pub async fn with_lock<R>(
        &self,
        user_id: UserId,
        body: impl AsyncFnOnce() -> R,
    ) -> Result<R, LockTimeout> {
        let _guard = self.acquire(user_id).await?;
        Ok(body().await)
    }

    fn release(&self, user_id: UserId, token: u64) {
        // Compare-and-delete: only the owner's token removes the slot.
        self.slots.remove_if(&user_id, |_, slot| slot.token == token);
    }
}

/// An acquired user lock; releases on drop.
pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    token: u64,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.user_id, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn lock_serializes_same_user() {
        let locks = Arc::new(UserLocks::new());
        let user = UserId::generate();
        let counter = Arc::new(std::sync::Mutex::new((0u32, 0u32))); // (current, max)

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .with_lock(user, async || {
                        {
                            let mut c = counter.lock().unwrap();
                            c.0 += 1;
                            c.1 = c.1.max(c.0);
                        }
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        counter.lock().unwrap().0 -= 1;
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.lock().unwrap().1, 1);
    }

    #[tokio::test]
    async fn distinct_users_do_not_contend() {
        let locks = UserLocks::new();
        let a = locks.acquire(UserId::generate()).await.unwrap();
        let b = locks.acquire(UserId::generate()).await.unwrap();
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn exhausted_retries_time_out() {
        let locks = UserLocks::with_config(LockConfig {
            ttl: Duration::from_secs(60),
            retry_delay: Duration::from_millis(1),
            max_jitter: Duration::from_millis(1),
            max_attempts: 3,
        });
        let user = UserId::generate();
        let _held = locks.acquire(user).await.unwrap();
        assert!(locks.acquire(user).await.is_err());
    }

    #[tokio::test]
    async fn expired_slot_is_reclaimable() {
        let locks = UserLocks::with_config(LockConfig {
            ttl: Duration::from_millis(10),
            retry_delay: Duration::from_millis(5),
            max_jitter: Duration::from_millis(1),
            max_attempts: 10,
        });
        let user = UserId::generate();
        let stale = locks.acquire(user).await.unwrap();
        // Hold past the TTL; a second acquirer takes over the slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = locks.acquire(user).await.unwrap();
        // The stale guard's conditional release must not evict the new owner.
        drop(stale);
        assert!(locks.slots.contains_key(&user));
        drop(fresh);
        assert!(!locks.slots.contains_key(&user));
    }
}
