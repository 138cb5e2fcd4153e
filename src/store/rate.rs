//! Per-principal fixed-window rate limiting.

use crate::error::{Error, Result};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

/// Counter-with-TTL rate limiter keyed by principal.
///
/// The increment is atomic and the TTL is only set after observing the
/// "no expiry" sentinel, so concurrent callers agree on both the count and
/// the window boundary.
#[derive(Clone)]
pub struct RateLimiter {
    conn: MultiplexedConnection,
    max_requests: u64,
    window_seconds: u64,
}

impl RateLimiter {
    /// Build a limiter over an existing Redis connection.
    pub fn new(conn: MultiplexedConnection, max_requests: u64, window_seconds: u64) -> Self {
        Self {
            conn,
            max_requests,
            window_seconds,
        }
    }

    fn key(principal: &str) -> String {
        format!("rate:{principal}")
    }

    /// Count one request for the principal; fail with `rate-limited` when
    /// the window budget is exhausted.
    pub async fn check(&self, principal: &str) -> Result<()> {
        let key = Self::key(principal);
        let mut conn = self.conn.clone();

        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .ttl(&key)
            .query_async(&mut conn)
            .await?;

        if ttl == -1 {
            // First request in a window: the key was just created without
            // an expiry.
            let _: () = conn.expire(&key, self.window_seconds as i64).await?;
        }

        if count > self.max_requests {
            return Err(Error::RateLimited);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shape() {
        assert_eq!(RateLimiter::key("alice"), "rate:alice");
        assert_eq!(RateLimiter::key("api:abcd1234"), "rate:api:abcd1234");
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis
    async fn test_window_budget_enforced() {
        let Ok(client) = redis::Client::open("redis://localhost:6379/15") else {
            return;
        };
        let Ok(conn) = client.get_multiplexed_tokio_connection().await else {
            eprintln!("Skipping rate limiter tests (Redis not available)");
            return;
        };

        // Unique principal per run to dodge leftover counters
        let principal = format!("rl-test-{}", std::process::id());
        let limiter = RateLimiter::new(conn, 3, 60);

        for _ in 0..3 {
            limiter.check(&principal).await.unwrap();
        }
        let err = limiter.check(&principal).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited));
    }
}
