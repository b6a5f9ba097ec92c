use crate::domain::ports::{Clock, KeyValueStorage, SystemClock};
use crate::utils::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct Entry<T> {
    value: T,
    expires_at_ms: i64,
}

/// Time-to-live key/value cache over any `KeyValueStorage`.
#[derive(Clone)]
pub struct TtlCache<S: KeyValueStorage> {
    storage: S,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStorage> TtlCache<S> {
    pub fn new(storage: S, default_ttl: Duration) -> Self {
        Self::with_clock(storage, default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: S, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            default_ttl,
            clock,
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.storage.get(key).await? else {
            return Ok(None);
        };

        let entry: Entry<T> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.storage.remove(key).await?;
                return Ok(None);
            }
        };

        if entry.expires_at_ms <= self.now_ms() {
            tracing::debug!("Cache entry {} expired", key);
            self.storage.remove(key).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = Entry {
            value,
            expires_at_ms: self.now_ms().saturating_add(ttl_ms),
        };
        self.storage.set(key, &serde_json::to_vec(&entry)?).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.storage.remove(key).await
    }
}
