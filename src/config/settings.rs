// Configuration structs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-wide settings for the training service.
///
/// Loaded once at startup and passed into the orchestrator at construction;
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for model checkpoints and final artifacts
    pub model_storage_path: PathBuf,

    /// Maximum jobs running concurrently (enforced by the dispatch layer)
    pub max_training_jobs: usize,

    /// Hard wall-clock limit per training job, in seconds
    pub training_timeout_secs: u64,

    /// TTL for progress-cache entries, in seconds
    pub progress_cache_ttl_secs: u64,

    /// Emit a batch-level progress notification every N batches
    pub progress_batch_interval: usize,

    /// Epoch-numbered checkpoints kept per job; best/final are never pruned.
    /// Zero keeps every epoch checkpoint.
    pub max_epoch_checkpoints: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_storage_path: PathBuf::from("./models"),
            max_training_jobs: 2,
            training_timeout_secs: 3600,
            progress_cache_ttl_secs: 300,
            progress_batch_interval: 10,
            max_epoch_checkpoints: 5,
        }
    }
}

impl Settings {
    pub fn training_timeout(&self) -> Duration {
        Duration::from_secs(self.training_timeout_secs)
    }

    pub fn progress_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_configuration() {
        let settings = Settings::default();
        assert_eq!(settings.max_training_jobs, 2);
        assert_eq!(settings.training_timeout_secs, 3600);
        assert_eq!(settings.progress_cache_ttl_secs, 300);
        assert_eq!(settings.progress_batch_interval, 10);
    }
}
