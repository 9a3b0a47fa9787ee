// Checkpoint management
//
// Every epoch writes a numbered recovery checkpoint; validation improvements
// additionally overwrite the single "best" snapshot, and the end of training
// overwrites the single "final" artifact. Numbered checkpoints are pruned,
// best/final never are.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{TrainError, TrainResult};
use crate::models::ModelConfig;
use crate::storage::ArtifactStorage;
use crate::training::{AdamState, SchedulerState, TrainingConfig, TrainingHistory};

const BEST_FILE: &str = "model_best.json";
const FINAL_FILE: &str = "final_model.json";
const EPOCH_PREFIX: &str = "checkpoint_epoch_";

/// Full trainer state at the end of one epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingCheckpoint {
    pub epoch: u32,
    pub timestamp: DateTime<Utc>,
    pub parameters: Vec<f32>,
    pub optimizer: AdamState,
    pub scheduler: SchedulerState,
    pub best_val_loss: f64,
    pub history: TrainingHistory,
    pub model_config: ModelConfig,
    pub training_config: TrainingConfig,
    pub checksum: String,
}

/// Artifact persisted on successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalArtifact {
    pub parameters: Vec<f32>,
    pub model_config: ModelConfig,
    pub training_config: TrainingConfig,
    pub history: TrainingHistory,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Hex sha256 over the little-endian parameter bytes.
pub fn parameter_checksum(parameters: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in parameters {
        hasher.update(value.to_le_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub struct CheckpointManager {
    storage: Arc<dyn ArtifactStorage>,
    dir: PathBuf,
    max_epoch_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new(
        storage: Arc<dyn ArtifactStorage>,
        dir: impl Into<PathBuf>,
        max_epoch_checkpoints: usize,
    ) -> Self {
        Self { storage, dir: dir.into(), max_epoch_checkpoints }
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join(FINAL_FILE)
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(BEST_FILE)
    }

    fn epoch_path(&self, epoch: u32) -> PathBuf {
        self.dir.join(format!("{EPOCH_PREFIX}{epoch}.json"))
    }

    /// Persist the epoch checkpoint, and the "best" copy when the epoch
    /// improved validation loss. Prunes old numbered checkpoints afterwards.
    pub fn save_epoch(&self, checkpoint: &TrainingCheckpoint, is_best: bool) -> TrainResult<()> {
        let blob = serde_json::to_vec(checkpoint).map_err(|e| TrainError::ArtifactPersistence {
            path: self.epoch_path(checkpoint.epoch).display().to_string(),
            source: e.into(),
        })?;

        self.storage.save(&self.epoch_path(checkpoint.epoch), &blob)?;
        if is_best {
            self.storage.save(&self.best_path(), &blob)?;
        }

        tracing::debug!(
            epoch = checkpoint.epoch,
            is_best,
            checksum = %checkpoint.checksum,
            "Saved checkpoint"
        );

        self.prune_epoch_checkpoints()?;
        Ok(())
    }

    pub fn save_final(&self, artifact: &FinalArtifact) -> TrainResult<PathBuf> {
        let path = self.final_path();
        let blob = serde_json::to_vec(artifact).map_err(|e| TrainError::ArtifactPersistence {
            path: path.display().to_string(),
            source: e.into(),
        })?;
        self.storage.save(&path, &blob)?;

        tracing::info!(
            path = %path.display(),
            epochs = artifact.history.len(),
            "Saved final model artifact"
        );
        Ok(path)
    }

    /// Side file with whatever history was collected before a failure.
    pub fn save_partial_history(&self, history: &TrainingHistory) -> TrainResult<PathBuf> {
        let path = self.dir.join("history_partial.json");
        let blob = serde_json::to_vec(history).map_err(|e| TrainError::ArtifactPersistence {
            path: path.display().to_string(),
            source: e.into(),
        })?;
        self.storage.save(&path, &blob)?;
        Ok(path)
    }

    pub fn load_epoch(&self, epoch: u32) -> TrainResult<TrainingCheckpoint> {
        let path = self.epoch_path(epoch);
        let blob = self.storage.load(&path)?;
        serde_json::from_slice(&blob).map_err(|e| TrainError::ArtifactPersistence {
            path: path.display().to_string(),
            source: e.into(),
        })
    }

    /// Epoch numbers with a checkpoint on storage, ascending.
    pub fn list_epochs(&self) -> TrainResult<Vec<u32>> {
        let mut epochs: Vec<u32> = self
            .storage
            .list(&self.dir)?
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                name.strip_prefix(EPOCH_PREFIX)?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        epochs.sort_unstable();
        Ok(epochs)
    }

    fn prune_epoch_checkpoints(&self) -> TrainResult<()> {
        if self.max_epoch_checkpoints == 0 {
            return Ok(());
        }

        let epochs = self.list_epochs()?;
        if epochs.len() <= self.max_epoch_checkpoints {
            return Ok(());
        }

        let excess = epochs.len() - self.max_epoch_checkpoints;
        for &epoch in &epochs[..excess] {
            self.storage.remove(&self.epoch_path(epoch))?;
        }
        tracing::debug!(removed = excess, kept = self.max_epoch_checkpoints, "Pruned old checkpoints");
        Ok(())
    }
}
