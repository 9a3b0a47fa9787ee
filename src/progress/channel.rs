// Progress channel
//
// Write-through cache mirroring the latest notification per job for
// low-latency polling. The durable job record is authoritative; this channel
// may lag or miss updates. Publishing never fails the caller: cache errors
// are logged and dropped. A notification carrying a lower epoch than the one
// already cached is discarded so pollers never see progress regress.

use std::sync::Arc;
use std::time::Duration;

use crate::progress::{ProgressCache, ProgressUpdate};

pub struct ProgressChannel {
    cache: Arc<dyn ProgressCache>,
    ttl: Duration,
}

impl ProgressChannel {
    pub fn new(cache: Arc<dyn ProgressCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(job_id: &str) -> String {
        format!("training_progress:{job_id}")
    }

    /// Best-effort publish of the latest notification.
    pub async fn publish(&self, update: &ProgressUpdate) {
        let key = Self::key(&update.job_id);

        if let Some(cached) = self.cache.get(&key).await {
            let cached_epoch = cached.get("epoch").and_then(serde_json::Value::as_u64);
            if let Some(cached_epoch) = cached_epoch {
                if u64::from(update.epoch) < cached_epoch {
                    tracing::debug!(
                        job_id = %update.job_id,
                        cached_epoch,
                        update_epoch = update.epoch,
                        "Discarding out-of-order progress notification"
                    );
                    return;
                }
            }
        }

        let value = match serde_json::to_value(update) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(job_id = %update.job_id, error = %e, "Failed to encode progress update");
                return;
            }
        };

        if let Err(e) = self.cache.set(&key, value, self.ttl).await {
            tracing::warn!(job_id = %update.job_id, error = %e, "Progress cache write failed");
        }
    }

    /// Most recent cached notification, if the key is warm.
    pub async fn latest(&self, job_id: &str) -> Option<ProgressUpdate> {
        let value = self.cache.get(&Self::key(job_id)).await?;
        match serde_json::from_value(value) {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Failed to decode cached progress");
                None
            }
        }
    }

    /// Drop the cached entry, e.g. when a job is cancelled.
    pub async fn clear(&self, job_id: &str) {
        self.cache.delete(&Self::key(job_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{BatchProgress, InMemoryProgressCache};
    use crate::training::ValidationMetrics;

    fn channel() -> ProgressChannel {
        ProgressChannel::new(Arc::new(InMemoryProgressCache::new()), Duration::from_secs(300))
    }

    fn epoch_update(job_id: &str, epoch: u32) -> ProgressUpdate {
        ProgressUpdate::epoch(
            job_id, epoch, 10, 0.5, 0.6, 0.8, 0.75, 0.001,
            ValidationMetrics::default(),
        )
    }

    #[tokio::test]
    async fn test_out_of_order_write_is_discarded() {
        let channel = channel();

        channel.publish(&epoch_update("J1", 5)).await;
        channel.publish(&epoch_update("J1", 3)).await;

        let latest = channel.latest("J1").await.unwrap();
        assert_eq!(latest.epoch, 5);
    }

    #[tokio::test]
    async fn test_same_epoch_overwrites() {
        let channel = channel();

        channel.publish(&epoch_update("J1", 2)).await;
        channel
            .publish(&ProgressUpdate::batch(
                "J1",
                2,
                10,
                BatchProgress { batch: 10, total_batches: 20, percent: 50.0, loss: 0.4 },
            ))
            .await;

        let latest = channel.latest("J1").await.unwrap();
        assert_eq!(latest.epoch, 2);
        assert!(latest.batch.is_some());
    }

    #[tokio::test]
    async fn test_cold_key_reads_none() {
        let channel = channel();
        assert!(channel.latest("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_entry() {
        let channel = channel();
        channel.publish(&epoch_update("J1", 1)).await;
        channel.clear("J1").await;
        assert!(channel.latest("J1").await.is_none());
    }
}
