//! Rate limiting primitives for login code requests.
//!
//! `WindowRateLimiter` keeps a sliding log per key in process memory. Counters
//! reset on restart and are not shared between instances; a multi-instance
//! deployment needs a `RateLimiter` backed by a shared store.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use super::clock::Clock;

/// Keys above this count trigger a sweep of idle entries.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// Record one attempt for `key` and report whether it is allowed.
    fn hit(&self, key: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn hit(&self, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

pub struct WindowRateLimiter {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    hits: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for WindowRateLimiter {
    fn hit(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let cutoff = now - self.window;
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, log| log.back().is_some_and(|last| *last > cutoff));
        }

        let log = hits.entry(key.to_string()).or_default();
        while log.front().is_some_and(|first| *first <= cutoff) {
            log.pop_front();
        }
        if log.len() >= self.limit {
            return RateLimitDecision::Limited;
        }
        log.push_back(now);
        RateLimitDecision::Allowed
    }
}

/// Login code requests are throttled per `(email, ip)` pair.
#[must_use]
pub fn login_code_key(email: &str, ip: Option<&str>) -> String {
    format!("{email}|{}", ip.unwrap_or("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;

    #[test]
    fn noop_rate_limiter_allows() {
        assert_eq!(NoopRateLimiter.hit("anything"), RateLimitDecision::Allowed);
    }

    #[test]
    fn window_limits_then_recovers() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = WindowRateLimiter::new(5, Duration::seconds(60), clock.clone());
        let key = login_code_key("a@example.com", Some("10.0.0.1"));

        for _ in 0..5 {
            assert_eq!(limiter.hit(&key), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.hit(&key), RateLimitDecision::Limited);

        clock.advance(Duration::seconds(59));
        assert_eq!(limiter.hit(&key), RateLimitDecision::Limited);

        clock.advance(Duration::seconds(1));
        assert_eq!(limiter.hit(&key), RateLimitDecision::Allowed);
    }

    #[test]
    fn keys_are_independent() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = WindowRateLimiter::new(1, Duration::seconds(60), clock);
        let first = login_code_key("a@example.com", Some("10.0.0.1"));
        let other_ip = login_code_key("a@example.com", Some("10.0.0.2"));
        let other_email = login_code_key("b@example.com", Some("10.0.0.1"));

        assert_eq!(limiter.hit(&first), RateLimitDecision::Allowed);
        assert_eq!(limiter.hit(&first), RateLimitDecision::Limited);
        assert_eq!(limiter.hit(&other_ip), RateLimitDecision::Allowed);
        assert_eq!(limiter.hit(&other_email), RateLimitDecision::Allowed);
    }
}
