//! One-time success flags that survive a redirect.

use chrono::TimeDelta;
use std::time::Duration;

use crate::db::FlashStore;
use crate::tokens::FlashKey;
use crate::SharedClock;

/// Raises and consumes flash flags.
pub struct FlashFlags {
    store: FlashStore,
    clock: SharedClock,
    ttl: Duration,
}

impl FlashFlags {
    pub fn new(store: FlashStore, clock: SharedClock, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Registers a new flag under a random key and returns the key.
    pub async fn raise(&self) -> Result<FlashKey, sqlx::Error> {
        let key = FlashKey::generate();
        let expires_at = self.clock.utc() + TimeDelta::seconds(self.ttl.as_secs() as i64);
        self.store.put(&key, expires_at).await?;
        Ok(key)
    }

    /// Returns `true` the first time a live key is presented, `false` after.
    pub async fn consume(&self, key: &str) -> Result<bool, sqlx::Error> {
        if key.is_empty() {
            return Ok(false);
        }
        self.store.take(key, self.clock.utc()).await
    }

    /// Drops flags whose window has passed.
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        self.store.purge_expired(self.clock.utc()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, test_pool, MutableClock};

    #[tokio::test]
    async fn test_raise_then_consume_once() {
        let (_dir, pool) = test_pool().await;
        let clock = MutableClock::new(at(0));
        let flags = FlashFlags::new(FlashStore::new(pool), clock, Duration::from_secs(120));

        let key = flags.raise().await.unwrap();

        assert!(flags.consume(key.as_str()).await.unwrap());
        assert!(!flags.consume(key.as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_flag_expires_after_ttl() {
        let (_dir, pool) = test_pool().await;
        let clock = MutableClock::new(at(0));
        let flags = FlashFlags::new(
            FlashStore::new(pool),
            clock.clone(),
            Duration::from_secs(120),
        );

        let key = flags.raise().await.unwrap();
        clock.advance_seconds(121);

        assert!(!flags.consume(key.as_str()).await.unwrap());
        assert_eq!(flags.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_and_guessed_keys() {
        let (_dir, pool) = test_pool().await;
        let clock = MutableClock::new(at(0));
        let flags = FlashFlags::new(FlashStore::new(pool), clock, Duration::from_secs(120));
        flags.raise().await.unwrap();

        assert!(!flags.consume("").await.unwrap());
        assert!(!flags.consume("1").await.unwrap());
    }
}
