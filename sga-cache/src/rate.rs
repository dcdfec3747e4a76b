use dashmap::DashMap;
use fxhash::FxBuildHasher;
use sga_core::models::UserId;
use std::time::{Duration, Instant};

/// A named request budget: at most `limit` calls per `window`.
#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    /// Maximum calls inside one window
    pub limit: u32,
    /// Window length
    pub window: Duration,
}

impl RateLimit {
    /// `limit` calls per second.
    pub const fn per_second(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(1),
        }
    }

    /// `limit` calls per minute.
    pub const fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
        }
    }
}

/// The caller exceeded a rate limit.
#[derive(Clone, Copy, Debug)]
pub struct RateExceeded {
    /// The budget that was exceeded
    pub limit: u32,
    /// Whole seconds until the window resets (at least 1)
    pub retry_after_secs: u64,
}

struct Window {
    started: Instant,
    count: u32,
}

/// Windowed counters per (operation prefix, user).
///
/// `increment; expire on first hit; reject above the limit`, the classic
/// fast-store counter idiom. This protects the system from floods; it is
/// additional to the per-user mutex, which is what protects correctness.
#[derive(Default)]
pub struct RateLimiter {
    counters: DashMap<(&'static str, UserId), Window, FxBuildHasher>,
}

impl RateLimiter {
    /// An empty counter table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call; report the remaining budget or the rejection.
    pub fn check(
        &self,
        prefix: &'static str,
        user_id: UserId,
        policy: RateLimit,
    ) -> Result<u32, RateExceeded> {
        let now = Instant::now();
        let mut window = self
            .counters
            .entry((prefix, user_id))
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        if now.duration_since(window.started) >= policy.window {
            window.started = now;
            window.count = 0;
        }

        window.count += 1;
        if window.count > policy.limit {
            let elapsed = now.duration_since(window.started);
            let retry_after = policy.window.saturating_sub(elapsed);
            Err(RateExceeded {
                limit: policy.limit,
                retry_after_secs: retry_after.as_secs().max(1),
            })
        } else {
            Ok(policy.limit - window.count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_the_budget_within_a_window() {
        let limiter = RateLimiter::new();
        let user = UserId::generate();
        let policy = RateLimit::per_second(5);

        for _ in 0..5 {
            assert!(limiter.check("bid", user, policy).is_ok());
        }
        let rejected = limiter.check("bid", user, policy).unwrap_err();
        assert_eq!(rejected.limit, 5);
        assert!(rejected.retry_after_secs >= 1);
    }

    #[test]
    fn prefixes_and_users_are_independent() {
        let limiter = RateLimiter::new();
        let (a, b) = (UserId::generate(), UserId::generate());
        let policy = RateLimit::per_second(1);

        assert!(limiter.check("bid", a, policy).is_ok());
        assert!(limiter.check("bid", a, policy).is_err());
        assert!(limiter.check("read", a, policy).is_ok());
        assert!(limiter.check("bid", b, policy).is_ok());
    }
}
