//! Rate limiting utilities

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::ClientId;

/// Simple token-bucket rate limiter, one bucket per IPC client
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens (requests) per bucket
    max_tokens: u32,
    /// How often tokens are replenished
    refill_interval: Duration,
    /// Per-client state
    clients: HashMap<ClientId, ClientBucket>,
}

#[derive(Debug)]
struct ClientBucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests allowed per interval
    /// * `interval` - Time interval for the limit
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            clients: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate limited
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        let now = Instant::now();

        let bucket = self.clients.entry(client_id.clone()).or_insert(ClientBucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval {
            let intervals = (elapsed.as_millis() / self.refill_interval.as_millis().max(1)) as u32;
            bucket.tokens = bucket
                .tokens
                .saturating_add(intervals.saturating_mul(self.max_tokens))
                .min(self.max_tokens);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            debug!(
                client_id = %client_id,
                retry_in_ms = self
                    .refill_interval
                    .saturating_sub(elapsed)
                    .as_millis() as u64,
                "Rate limit exceeded"
            );
            false
        }
    }

    /// Remove a client's rate limit state
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_within_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();

        for _ in 0..5 {
            assert!(limiter.check(&client));
        }

        assert!(!limiter.check(&client));
    }

    #[test]
    fn separate_buckets_per_client() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let gateway = ClientId::new();
        let observer = ClientId::new();

        assert!(limiter.check(&gateway));
        assert!(limiter.check(&gateway));
        assert!(!limiter.check(&gateway));

        assert!(limiter.check(&observer));
        assert!(limiter.check(&observer));
    }

    #[test]
    fn removed_client_starts_fresh() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let client = ClientId::new();

        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));

        limiter.remove_client(&client);
        assert!(limiter.check(&client));
    }
}
