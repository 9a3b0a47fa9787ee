// Error taxonomy for the training pipeline
//
// Every externally-surfaced failure carries a human-readable message plus a
// machine-distinguishable kind. Collaborator errors (storage, model backends)
// are wrapped at the seam where they enter the pipeline.

use thiserror::Error;

use crate::jobs::JobStatus;

pub type TrainResult<T> = Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    /// Dataset is missing or not in the "ready" state. The job goes straight
    /// to failed; there is no retry.
    #[error("dataset {dataset_id} is not ready for training: {reason}")]
    DatasetNotReady { dataset_id: String, reason: String },

    /// Invalid hyperparameters or an unusable train/validation split,
    /// detected before any epoch runs.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Loss became non-finite for more than one consecutive batch.
    #[error("training diverged at epoch {epoch}, batch {batch}: loss is not finite")]
    TrainingDiverged { epoch: u32, batch: usize },

    /// Attempted job transition not permitted by the lifecycle state machine.
    /// The record is left unchanged.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    /// A second `run` was attempted for a job that is already executing.
    #[error("training job {0} is already running")]
    ConcurrentRun(String),

    /// Checkpoint or final-artifact write failed. Fatal for the job only when
    /// the final artifact is affected.
    #[error("failed to persist artifact {path}: {source}")]
    ArtifactPersistence {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("training job {0} not found")]
    JobNotFound(String),

    /// Failure reported by the trainable model implementation.
    #[error("model error: {0}")]
    Model(String),
}

impl TrainError {
    /// Message persisted into a failed job record. Collaborator messages can
    /// be arbitrarily long; the record keeps a bounded prefix.
    pub fn job_message(&self) -> String {
        const MAX_LEN: usize = 1024;
        let mut message = self.to_string();
        if message.len() > MAX_LEN {
            let mut end = MAX_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
            message.push_str("...");
        }
        message
    }
}
