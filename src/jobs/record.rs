// Job and model records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::jobs::JobStatus;
use crate::models::ModelConfig;
use crate::training::{TrainingConfig, ValidationMetrics};

/// Request to create a new training job.
#[derive(Debug, Clone)]
pub struct TrainingJobRequest {
    pub name: String,
    pub dataset_id: String,
    pub model_config: ModelConfig,
    pub training_config: TrainingConfig,
    pub created_by: String,
}

/// Durable record of one training run. Owned exclusively by the orchestrator
/// while the status is non-terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: String,
    pub name: String,
    pub dataset_id: String,
    pub model_type: String,
    pub status: JobStatus,
    pub model_config: ModelConfig,
    pub training_config: TrainingConfig,
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub progress_percentage: f64,
    pub training_loss: Option<f64>,
    pub validation_loss: Option<f64>,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Set only on successful completion
    pub model_path: Option<PathBuf>,
    /// Set only on failure
    pub error_message: Option<String>,
    /// Background-task handle
    pub task_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingJob {
    pub fn new(request: &TrainingJobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: request.name.clone(),
            dataset_id: request.dataset_id.clone(),
            model_type: request.model_config.model_type.clone(),
            status: JobStatus::Queued,
            model_config: request.model_config.clone(),
            training_config: request.training_config.clone(),
            current_epoch: 0,
            total_epochs: request.training_config.epochs,
            progress_percentage: 0.0,
            training_loss: None,
            validation_loss: None,
            accuracy: None,
            precision: None,
            recall: None,
            f1_score: None,
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            model_path: None,
            error_message: None,
            task_id: None,
            created_by: request.created_by.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied to a job record; unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub current_epoch: Option<u32>,
    pub progress_percentage: Option<f64>,
    pub training_loss: Option<f64>,
    pub validation_loss: Option<f64>,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub model_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub task_id: Option<String>,
}

impl JobUpdate {
    pub fn apply(&self, job: &mut TrainingJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(epoch) = self.current_epoch {
            job.current_epoch = epoch;
        }
        if let Some(progress) = self.progress_percentage {
            job.progress_percentage = progress;
        }
        if let Some(loss) = self.training_loss {
            job.training_loss = Some(loss);
        }
        if let Some(loss) = self.validation_loss {
            job.validation_loss = Some(loss);
        }
        if let Some(value) = self.accuracy {
            job.accuracy = Some(value);
        }
        if let Some(value) = self.precision {
            job.precision = Some(value);
        }
        if let Some(value) = self.recall {
            job.recall = Some(value);
        }
        if let Some(value) = self.f1_score {
            job.f1_score = Some(value);
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(at) = self.estimated_completion {
            job.estimated_completion = Some(at);
        }
        if let Some(path) = &self.model_path {
            job.model_path = Some(path.clone());
        }
        if let Some(message) = &self.error_message {
            job.error_message = Some(message.clone());
        }
        if let Some(task_id) = &self.task_id {
            job.task_id = Some(task_id.clone());
        }
        job.updated_at = Utc::now();
    }
}

/// Durable record of a trained artifact, created exactly once per successful
/// job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub model_type: String,
    pub training_job_id: String,
    pub training_dataset_id: String,
    pub model_path: PathBuf,
    pub config: ModelConfig,
    pub accuracy: Option<f64>,
    pub performance: ValidationMetrics,
    pub is_default: bool,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
