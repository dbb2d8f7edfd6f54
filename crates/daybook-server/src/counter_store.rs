//! Windowed counters backing the admission policies.
//!
//! Two realizations share the [`CounterStore`] contract:
//!
//! - [`LocalCounterStore`]: a process-local map. State is lost on restart and
//!   is not shared between instances, so it only suits single-instance
//!   deployments. It is safe for concurrent requests within one process.
//! - [`RedisCounterStore`]: an atomic `INCR` with an expiry set only when the
//!   key is created, shared by every instance pointing at the same Redis.
//!
//! Keys carry the window bucket (`unix_seconds / window_seconds`), so a new
//! window always starts from a fresh key. Expiry only bounds storage.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::Pool;
use bb8_redis::redis::{self, Script};
use bb8_redis::RedisConnectionManager;
use chrono::{DateTime, Utc};
use mockable::Clock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("Counter backend unavailable: {0}")]
    Unavailable(String),

    #[error("Counter backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Composite counter identifier: policy namespace, subject and window bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    namespace: &'static str,
    subject: String,
    bucket: i64,
}

impl CounterKey {
    /// Key for `subject` in the fixed window of length `window` containing `now`.
    pub fn for_window(
        namespace: &'static str,
        subject: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let window_secs = window.as_secs().max(1) as i64;
        Self {
            namespace,
            subject: subject.to_string(),
            bucket: now.timestamp().div_euclid(window_secs),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.subject, self.bucket)
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` and return the post-increment count.
    ///
    /// A key that does not exist is created with count 1 and an expiry of
    /// `now + window`.
    async fn increment(&self, key: &CounterKey, window: Duration) -> Result<u64, CounterStoreError>;

    /// Remove keys whose window has elapsed. Returns how many were removed.
    async fn sweep(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Counter {
    count: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LocalCounterStore {
    counters: Arc<Mutex<HashMap<String, Counter>>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl LocalCounterStore {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }
}

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn increment(&self, key: &CounterKey, window: Duration) -> Result<u64, CounterStoreError> {
        let now = self.clock.utc();
        let ttl = chrono::Duration::from_std(window)
            .map_err(|e| CounterStoreError::Unavailable(format!("window out of range: {e}")))?;

        let mut counters = self.counters.lock().await;
        let counter = counters.entry(key.to_string()).or_insert_with(|| Counter {
            count: 0,
            expires_at: now + ttl,
        });

        if counter.expires_at <= now {
            *counter = Counter {
                count: 0,
                expires_at: now + ttl,
            };
        }

        counter.count += 1;
        Ok(counter.count)
    }

    async fn sweep(&self) -> usize {
        let now = self.clock.utc();
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, counter| counter.expires_at > now);
        let removed = before - counters.len();
        if removed > 0 {
            debug!(removed, "Swept expired rate-limit counters");
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Increment, and set the expiry only when this call created the key.
/// Running both as one script keeps concurrent first hits from racing.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

#[derive(Clone)]
pub struct RedisCounterStore {
    pool: Pool<RedisConnectionManager>,
    script: Arc<Script>,
}

impl RedisCounterStore {
    /// Build a pool for `url` and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, CounterStoreError> {
        let manager = RedisConnectionManager::new(url)?;
        let pool = Pool::builder()
            .max_size(16)
            .connection_timeout(Duration::from_secs(2))
            .build(manager)
            .await?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CounterStoreError::Unavailable(e.to_string()))?;
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        }

        Ok(Self {
            pool,
            script: Arc::new(Script::new(INCREMENT_SCRIPT)),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &CounterKey, window: Duration) -> Result<u64, CounterStoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CounterStoreError::Unavailable(e.to_string()))?;

        let window_ms = window.as_millis().max(1) as u64;
        let count: u64 = self
            .script
            .key(key.to_string())
            .arg(window_ms)
            .invoke_async(&mut *conn)
            .await?;
        Ok(count)
    }

    async fn sweep(&self) -> usize {
        // Redis expires keys natively.
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MutableClock;
    use chrono::TimeZone;

    const MINUTE: Duration = Duration::from_secs(60);

    fn store_at(clock: &Arc<MutableClock>) -> LocalCounterStore {
        LocalCounterStore::new(clock.clone())
    }

    fn key(clock: &MutableClock, subject: &str) -> CounterKey {
        CounterKey::for_window("global-ip", subject, MINUTE, clock.utc())
    }

    #[tokio::test]
    async fn test_first_increment_returns_one() {
        let clock = Arc::new(MutableClock::default());
        let store = store_at(&clock);

        for subject in ["10.0.0.1", "10.0.0.2", "anonymous"] {
            assert_eq!(store.increment(&key(&clock, subject), MINUTE).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_counts_are_monotonic_within_window() {
        let clock = Arc::new(MutableClock::default());
        let store = store_at(&clock);
        let k = key(&clock, "10.0.0.1");

        for expected in 1..=10 {
            assert_eq!(store.increment(&k, MINUTE).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_count_resets_after_window() {
        let clock = Arc::new(MutableClock::default());
        let store = store_at(&clock);

        for _ in 0..5 {
            store.increment(&key(&clock, "10.0.0.1"), MINUTE).await.unwrap();
        }

        clock.advance(MINUTE);
        assert_eq!(store.increment(&key(&clock, "10.0.0.1"), MINUTE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_key_is_replaced_in_place() {
        let clock = Arc::new(MutableClock::default());
        let store = store_at(&clock);
        // Same key object across the expiry: the stale count must not leak.
        let k = key(&clock, "10.0.0.1");

        store.increment(&k, MINUTE).await.unwrap();
        store.increment(&k, MINUTE).await.unwrap();
        clock.advance(MINUTE);
        assert_eq!(store.increment(&k, MINUTE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_keys() {
        let clock = Arc::new(MutableClock::default());
        let store = store_at(&clock);

        store.increment(&key(&clock, "old"), MINUTE).await.unwrap();
        clock.advance(Duration::from_secs(90));
        store.increment(&key(&clock, "fresh"), MINUTE).await.unwrap();

        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_key_layout() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 30).unwrap();
        let k = CounterKey::for_window("entry-quota", "user-1", MINUTE, now);
        assert_eq!(k.to_string(), format!("entry-quota:user-1:{}", now.timestamp() / 60));
        assert_eq!(k.namespace(), "entry-quota");
    }
}
