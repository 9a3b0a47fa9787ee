// Training pipeline: epoch loop, optimization, checkpointing

mod checkpoint;
mod history;
mod loader;
mod metrics;
mod optimizer;
mod scheduler;
mod trainer;

pub use checkpoint::{parameter_checksum, CheckpointManager, FinalArtifact, TrainingCheckpoint};
pub use history::{EpochRecord, TrainingHistory};
pub use loader::BatchLoader;
pub use metrics::{accuracy, weighted_precision_recall_f1, ValidationMetrics};
pub use optimizer::{Adam, AdamState};
pub use scheduler::{ReduceLrOnPlateau, SchedulerState};
pub use trainer::{EpochLoopExit, EpochTrainer, StopReason, TrainingReport};

use serde::{Deserialize, Serialize};

use crate::dataset::AugmentationConfig;
use crate::errors::{TrainError, TrainResult};

/// Training hyperparameters, validated once at job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: u32,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Early stopping: epochs without validation improvement before the loop
    /// halts
    pub patience: u32,
    /// Plateau scheduler window, independent of early stopping
    pub scheduler_patience: u32,
    pub scheduler_factor: f64,
    pub seed: u64,
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            weight_decay: 1e-4,
            patience: 10,
            scheduler_patience: 5,
            scheduler_factor: 0.5,
            seed: 42,
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> TrainResult<()> {
        if self.epochs == 0 {
            return Err(TrainError::Configuration("epochs must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::Configuration("batch_size must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainError::Configuration(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(TrainError::Configuration(format!(
                "weight_decay must be >= 0, got {}",
                self.weight_decay
            )));
        }
        if self.patience == 0 {
            return Err(TrainError::Configuration("patience must be >= 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.scheduler_factor) {
            return Err(TrainError::Configuration(format!(
                "scheduler_factor must be in (0, 1), got {}",
                self.scheduler_factor
            )));
        }
        self.augmentation
            .validate()
            .map_err(TrainError::Configuration)?;
        Ok(())
    }
}
