// Short-TTL progress cache
//
// The Redis-shaped seam: set with expiry, get, delete. The bundled
// implementation keeps entries in a concurrent map with lazy expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::TrainResult;

#[async_trait]
pub trait ProgressCache: Send + Sync {
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> TrainResult<()>;

    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    async fn delete(&self, key: &str) -> bool;
}

#[derive(Default)]
pub struct InMemoryProgressCache {
    entries: DashMap<String, (serde_json::Value, Instant)>,
}

impl InMemoryProgressCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for InMemoryProgressCache {
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> TrainResult<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if Instant::now() < entry.value().1 {
                    return Some(entry.value().0.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }
}
