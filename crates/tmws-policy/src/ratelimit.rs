//! Per-agent token-bucket rate limiting.
//!
//! Each agent holds three independent buckets (requests, searches,
//! writes). When a bucket is exhausted the caller gets `ErrRateLimited`
//! with a `retry_after` hint.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use tmws_core::{Result, TmwsError};

/// What kind of quota a call consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Request,
    Search,
    Write,
}

/// Per-minute quotas.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_min: u32,
    pub searches_per_min: u32,
    pub writes_per_min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_min: 1000,
            searches_per_min: 100,
            writes_per_min: 500,
        }
    }
}

/// A token bucket for a single quota.
#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(burst: u32) -> Self {
        Self {
            tokens: burst as f64,
            last_refill: Instant::now(),
        }
    }

    /// Refill from elapsed time, then try to consume one token.
    fn try_consume(&mut self, burst: u32, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(burst as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until the next token is available.
    fn retry_after(&self, refill_per_sec: f64) -> u64 {
        if refill_per_sec <= 0.0 {
            return 60;
        }
        let needed = 1.0 - self.tokens;
        (needed / refill_per_sec).ceil().max(1.0) as u64
    }
}

#[derive(Debug, Clone)]
struct AgentBuckets {
    requests: Bucket,
    searches: Bucket,
    writes: Bucket,
}

/// Shared rate limiter, keyed by agent id.
#[derive(Clone)]
pub struct AgentRateLimiter {
    buckets: Arc<DashMap<String, AgentBuckets>>,
    config: RateLimitConfig,
}

impl AgentRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Consume one token of `kind` for `agent_id`.
    pub fn check(&self, agent_id: &str, kind: LimitKind) -> Result<()> {
        let mut entry = self
            .buckets
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentBuckets {
                requests: Bucket::new(self.config.requests_per_min),
                searches: Bucket::new(self.config.searches_per_min),
                writes: Bucket::new(self.config.writes_per_min),
            });

        let (bucket, burst) = match kind {
            LimitKind::Request => (&mut entry.requests, self.config.requests_per_min),
            LimitKind::Search => (&mut entry.searches, self.config.searches_per_min),
            LimitKind::Write => (&mut entry.writes, self.config.writes_per_min),
        };
        let refill_per_sec = burst as f64 / 60.0;

        if bucket.try_consume(burst, refill_per_sec) {
            Ok(())
        } else {
            let retry_after_secs = bucket.retry_after(refill_per_sec).min(60);
            warn!(agent = agent_id, ?kind, retry_after_secs, "rate limited");
            Err(TmwsError::RateLimited { retry_after_secs })
        }
    }

    /// Evict buckets idle for more than five minutes. Call periodically
    /// from a background task.
    pub fn cleanup(&self) {
        let cutoff = Instant::now() - std::time::Duration::from_secs(300);
        self.buckets
            .retain(|_agent, buckets| buckets.requests.last_refill > cutoff);
    }

    #[cfg(test)]
    fn tracked_agents(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RateLimitConfig {
        RateLimitConfig {
            requests_per_min: 5,
            searches_per_min: 2,
            writes_per_min: 3,
        }
    }

    #[test]
    fn burst_then_denied_with_hint() {
        let limiter = AgentRateLimiter::new(small_config());
        for _ in 0..5 {
            limiter.check("athena-conductor", LimitKind::Request).unwrap();
        }
        let err = limiter
            .check("athena-conductor", LimitKind::Request)
            .unwrap_err();
        assert_eq!(err.wire_code(), "ErrRateLimited");
        let hint = err.retry_after().unwrap();
        assert!(hint >= 1 && hint <= 60);
    }

    #[test]
    fn kinds_are_independent() {
        let limiter = AgentRateLimiter::new(small_config());
        limiter.check("a", LimitKind::Search).unwrap();
        limiter.check("a", LimitKind::Search).unwrap();
        assert!(limiter.check("a", LimitKind::Search).is_err());
        // Search exhaustion does not block writes.
        assert!(limiter.check("a", LimitKind::Write).is_ok());
    }

    #[test]
    fn agents_are_independent() {
        let limiter = AgentRateLimiter::new(small_config());
        for _ in 0..2 {
            limiter.check("a", LimitKind::Search).unwrap();
        }
        assert!(limiter.check("a", LimitKind::Search).is_err());
        assert!(limiter.check("b", LimitKind::Search).is_ok());
    }

    #[test]
    fn cleanup_keeps_recent_buckets() {
        let limiter = AgentRateLimiter::new(RateLimitConfig::default());
        limiter.check("a", LimitKind::Request).unwrap();
        limiter.cleanup();
        assert_eq!(limiter.tracked_agents(), 1);
    }
}
