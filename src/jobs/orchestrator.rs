// Training job orchestrator
//
// Owns the job lifecycle: validates preconditions, drives the epoch trainer,
// propagates progress to the durable record and the progress channel, creates
// the model record on success and exposes cancellation. The job record is
// authoritative; the channel is a cache that may lag or miss updates.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::dataset::{prepare_splits, FeatureSource};
use crate::errors::{TrainError, TrainResult};
use crate::jobs::{
    AIModel, DatasetStore, JobStatus, JobStore, JobUpdate, ModelStore, TaskHandle, TaskRunner,
    TrainingJob, TrainingJobRequest,
};
use crate::models::{ModelConfig, ModelFactory};
use crate::progress::{ProgressChannel, ProgressCache, ProgressSink, ProgressUpdate};
use crate::storage::ArtifactStorage;
use crate::training::{
    CheckpointManager, EpochLoopExit, EpochTrainer, TrainingConfig, TrainingReport,
    ValidationMetrics,
};

/// Outcome of a finished `run` invocation.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub model_id: Option<String>,
    pub report: Option<TrainingReport>,
}

/// Poller view: durable record merged with cached low-latency extras.
#[derive(Debug, Clone)]
pub struct TrainingProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub progress_percentage: f64,
    pub training_loss: Option<f64>,
    pub validation_loss: Option<f64>,
    pub accuracy: Option<f64>,
    pub learning_rate: Option<f64>,
    pub estimated_completion: Option<chrono::DateTime<Utc>>,
    pub detailed_metrics: Option<ValidationMetrics>,
}

struct ActiveRun {
    token: CancellationToken,
    running: AtomicBool,
    handle: Option<TaskHandle>,
}

pub struct TrainingOrchestrator {
    settings: Settings,
    jobs: Arc<dyn JobStore>,
    datasets: Arc<dyn DatasetStore>,
    models: Arc<dyn ModelStore>,
    artifacts: Arc<dyn ArtifactStorage>,
    factory: Arc<dyn ModelFactory>,
    features: Arc<dyn FeatureSource>,
    channel: Arc<ProgressChannel>,
    runner: Arc<dyn TaskRunner>,
    active: DashMap<String, ActiveRun>,
}

impl TrainingOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        jobs: Arc<dyn JobStore>,
        datasets: Arc<dyn DatasetStore>,
        models: Arc<dyn ModelStore>,
        artifacts: Arc<dyn ArtifactStorage>,
        factory: Arc<dyn ModelFactory>,
        features: Arc<dyn FeatureSource>,
        cache: Arc<dyn ProgressCache>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        let channel = Arc::new(ProgressChannel::new(cache, settings.progress_cache_ttl()));
        Self {
            settings,
            jobs,
            datasets,
            models,
            artifacts,
            factory,
            features,
            channel,
            runner,
            active: DashMap::new(),
        }
    }

    /// Create a queued job record. Configuration is validated here, once,
    /// rather than deep inside the training loop.
    pub async fn create_job(&self, request: TrainingJobRequest) -> TrainResult<TrainingJob> {
        request.model_config.validate()?;
        request.training_config.validate()?;

        let job = TrainingJob::new(&request);
        self.jobs.create(job.clone()).await?;

        tracing::info!(
            job_id = %job.id,
            dataset_id = %job.dataset_id,
            model_type = %job.model_type,
            epochs = job.total_epochs,
            "Created training job"
        );
        Ok(job)
    }

    /// Hand the job to the background task runner and record the task handle.
    pub async fn submit(self: &Arc<Self>, job: &TrainingJob) -> TrainResult<TaskHandle> {
        let token = CancellationToken::new();
        self.active.insert(
            job.id.clone(),
            ActiveRun { token: token.clone(), running: AtomicBool::new(false), handle: None },
        );

        let orchestrator = Arc::clone(self);
        let job_id = job.id.clone();
        let dataset_id = job.dataset_id.clone();
        let model_config = job.model_config.clone();
        let training_config = job.training_config.clone();
        let user_id = job.created_by.clone();

        let task = Box::pin(async move {
            let result = orchestrator
                .run(&job_id, &dataset_id, model_config, training_config, &user_id)
                .await;
            if let Err(e) = result {
                tracing::error!(job_id = %job_id, error = %e, "Training task failed");
            }
        });

        let handle = self.runner.submit(task, token);
        if let Some(mut entry) = self.active.get_mut(&job.id) {
            entry.handle = Some(handle.clone());
        }
        let _ = self
            .jobs
            .update(&job.id, JobUpdate { task_id: Some(handle.id.clone()), ..JobUpdate::default() })
            .await;

        Ok(handle)
    }

    /// Create the job record and submit it in one step.
    pub async fn submit_job(self: &Arc<Self>, request: TrainingJobRequest) -> TrainResult<TrainingJob> {
        let job = self.create_job(request).await?;
        self.submit(&job).await?;
        Ok(job)
    }

    /// Execute one training job to a terminal state.
    ///
    /// Blocks for the full duration of training from the runner's point of
    /// view. Must not run twice concurrently for the same job.
    pub async fn run(
        &self,
        job_id: &str,
        dataset_id: &str,
        model_config: ModelConfig,
        training_config: TrainingConfig,
        user_id: &str,
    ) -> TrainResult<TrainingOutcome> {
        let token = self.claim_run(job_id)?;
        let _guard = RunGuard { active: &self.active, job_id };

        let job = self
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| TrainError::JobNotFound(job_id.to_string()))?;

        // Cancelled before pickup
        if token.is_cancelled() || job.status == JobStatus::Cancelled {
            return Ok(TrainingOutcome {
                job_id: job_id.to_string(),
                status: JobStatus::Cancelled,
                model_id: None,
                report: None,
            });
        }
        job.status.validate_transition(JobStatus::Running)?;

        // Preparation: everything that can fail before the job is marked
        // running goes straight to failed
        let prepared = self
            .prepare(dataset_id, &model_config, &training_config)
            .await;
        let (dataset_name, splits, model) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.fail_job(job_id, &e).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        self.transition(
            job_id,
            JobStatus::Running,
            JobUpdate {
                started_at: Some(now),
                // Deliberately naive horizon, set once and never recomputed
                estimated_completion: Some(now + ChronoDuration::hours(1)),
                ..JobUpdate::default()
            },
        )
        .await?;

        let forwarder = Arc::new(ProgressForwarder {
            job_id: job_id.to_string(),
            jobs: Arc::clone(&self.jobs),
            channel: Arc::clone(&self.channel),
            cancel: token.clone(),
            last_epoch: AtomicU32::new(0),
        });

        let checkpoints = CheckpointManager::new(
            Arc::clone(&self.artifacts),
            PathBuf::from(job_id),
            self.settings.max_epoch_checkpoints,
        );
        let mut trainer = EpochTrainer::new(
            job_id,
            model,
            model_config.clone(),
            training_config,
            checkpoints,
            forwarder,
            self.settings.progress_batch_interval,
        );

        match trainer.train(&splits, self.features.as_ref(), &token).await {
            Ok(EpochLoopExit::Completed(report)) => {
                self.complete_job(job_id, dataset_id, &dataset_name, &model_config, user_id, &report)
                    .await
            }
            Ok(EpochLoopExit::Cancelled { epochs_run }) => {
                tracing::info!(job_id, epochs_run, "Run stopped by cancellation");
                Ok(TrainingOutcome {
                    job_id: job_id.to_string(),
                    status: JobStatus::Cancelled,
                    model_id: None,
                    report: None,
                })
            }
            Err(e) => {
                if matches!(e, TrainError::TrainingDiverged { .. }) {
                    match trainer.save_partial_history() {
                        Ok(path) => {
                            tracing::info!(job_id, path = %path.display(), "Saved partial history")
                        }
                        Err(save_err) => {
                            tracing::warn!(job_id, error = %save_err, "Could not save partial history")
                        }
                    }
                }
                self.fail_job(job_id, &e).await;
                Err(e)
            }
        }
    }

    /// Cancel a queued or running job. Best-effort towards the in-flight
    /// task; the record transition is unconditional.
    pub async fn cancel(&self, job_id: &str) -> TrainResult<bool> {
        let job = self
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| TrainError::JobNotFound(job_id.to_string()))?;
        job.status.validate_transition(JobStatus::Cancelled)?;

        if let Some(entry) = self.active.get(job_id) {
            match &entry.handle {
                Some(handle) => {
                    self.runner.cancel(handle);
                }
                None => entry.token.cancel(),
            }
        }

        let _ = self
            .jobs
            .update(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Cancelled),
                    completed_at: Some(Utc::now()),
                    ..JobUpdate::default()
                },
            )
            .await;
        self.channel.clear(job_id).await;
        self.active.remove(job_id);

        tracing::info!(job_id, "Training job cancelled");
        Ok(true)
    }

    /// Near-real-time progress: the durable record, overlaid with cached
    /// extras when the channel key is warm. A cold key is not an error.
    pub async fn progress(&self, job_id: &str) -> TrainResult<TrainingProgress> {
        let job = self
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| TrainError::JobNotFound(job_id.to_string()))?;

        let mut progress = TrainingProgress {
            job_id: job_id.to_string(),
            status: job.status,
            current_epoch: job.current_epoch,
            total_epochs: job.total_epochs,
            progress_percentage: job.progress_percentage,
            training_loss: job.training_loss,
            validation_loss: job.validation_loss,
            accuracy: job.accuracy,
            learning_rate: None,
            estimated_completion: job.estimated_completion,
            detailed_metrics: None,
        };

        if let Some(cached) = self.channel.latest(job_id).await {
            progress.learning_rate = cached.learning_rate;
            progress.detailed_metrics = cached.detailed_metrics;
        }

        Ok(progress)
    }

    fn claim_run(&self, job_id: &str) -> TrainResult<CancellationToken> {
        let entry = self.active.entry(job_id.to_string()).or_insert_with(|| ActiveRun {
            token: CancellationToken::new(),
            running: AtomicBool::new(false),
            handle: None,
        });
        if entry.running.swap(true, Ordering::SeqCst) {
            return Err(TrainError::ConcurrentRun(job_id.to_string()));
        }
        Ok(entry.token.clone())
    }

    async fn prepare(
        &self,
        dataset_id: &str,
        model_config: &ModelConfig,
        training_config: &TrainingConfig,
    ) -> TrainResult<(String, crate::dataset::DatasetSplits, Box<dyn crate::models::TrainableModel>)>
    {
        model_config.validate()?;
        training_config.validate()?;

        let dataset = self.datasets.get(dataset_id).await.ok_or_else(|| {
            TrainError::DatasetNotReady {
                dataset_id: dataset_id.to_string(),
                reason: "dataset not found".to_string(),
            }
        })?;

        let splits = prepare_splits(&dataset)?;
        let model = self.factory.create(model_config)?;
        Ok((dataset.name, splits, model))
    }

    async fn complete_job(
        &self,
        job_id: &str,
        dataset_id: &str,
        dataset_name: &str,
        model_config: &ModelConfig,
        user_id: &str,
        report: &TrainingReport,
    ) -> TrainResult<TrainingOutcome> {
        // A cancel may have landed while the final artifact was being written
        let current = self
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| TrainError::JobNotFound(job_id.to_string()))?;
        if current.status == JobStatus::Cancelled {
            return Ok(TrainingOutcome {
                job_id: job_id.to_string(),
                status: JobStatus::Cancelled,
                model_id: None,
                report: None,
            });
        }

        let model = AIModel {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("CAD Model - {}", Utc::now().format("%Y%m%d_%H%M%S")),
            description: Some(format!("Trained on dataset {dataset_name}")),
            version: "1.0.0".to_string(),
            model_type: model_config.model_type.clone(),
            training_job_id: job_id.to_string(),
            training_dataset_id: dataset_id.to_string(),
            model_path: report.model_path.clone(),
            config: model_config.clone(),
            accuracy: Some(report.final_val_acc),
            performance: report.detailed_metrics,
            is_default: false,
            status: "active".to_string(),
            created_by: user_id.to_string(),
            created_at: Utc::now(),
        };
        let model = self.models.create(model).await?;

        self.transition(
            job_id,
            JobStatus::Completed,
            JobUpdate {
                completed_at: Some(Utc::now()),
                model_path: Some(report.model_path.clone()),
                training_loss: Some(report.final_train_loss),
                validation_loss: Some(report.final_val_loss),
                accuracy: Some(report.final_val_acc),
                precision: Some(report.detailed_metrics.precision),
                recall: Some(report.detailed_metrics.recall),
                f1_score: Some(report.detailed_metrics.f1_score),
                progress_percentage: Some(100.0),
                ..JobUpdate::default()
            },
        )
        .await?;

        tracing::info!(
            job_id,
            model_id = %model.id,
            epochs_trained = report.epochs_trained,
            best_val_loss = report.best_val_loss,
            "Training job completed"
        );

        Ok(TrainingOutcome {
            job_id: job_id.to_string(),
            status: JobStatus::Completed,
            model_id: Some(model.id),
            report: Some(report.clone()),
        })
    }

    /// Validated transition; rejected transitions leave the record unchanged.
    async fn transition(
        &self,
        job_id: &str,
        to: JobStatus,
        mut update: JobUpdate,
    ) -> TrainResult<TrainingJob> {
        let job = self
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| TrainError::JobNotFound(job_id.to_string()))?;
        job.status.validate_transition(to)?;

        update.status = Some(to);
        self.jobs
            .update(job_id, update)
            .await
            .ok_or_else(|| TrainError::JobNotFound(job_id.to_string()))
    }

    async fn fail_job(&self, job_id: &str, error: &TrainError) {
        let result = self
            .transition(
                job_id,
                JobStatus::Failed,
                JobUpdate {
                    error_message: Some(error.job_message()),
                    completed_at: Some(Utc::now()),
                    ..JobUpdate::default()
                },
            )
            .await;

        match result {
            Ok(_) => tracing::error!(job_id, error = %error, "Training job failed"),
            // Already terminal, e.g. cancelled while the failure propagated
            Err(e) => tracing::warn!(job_id, error = %e, "Could not mark job failed"),
        }
    }
}

/// Removes the active-run entry when `run` exits, including when the runner
/// drops the future on cancellation or timeout.
struct RunGuard<'a> {
    active: &'a DashMap<String, ActiveRun>,
    job_id: &'a str,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(self.job_id);
    }
}

/// Dual-writes progress: epoch-level notifications go to the durable record
/// in epoch order and to the channel; batch-level ones to the channel only.
/// Notifications for a cancelled job are suppressed.
struct ProgressForwarder {
    job_id: String,
    jobs: Arc<dyn JobStore>,
    channel: Arc<ProgressChannel>,
    cancel: CancellationToken,
    last_epoch: AtomicU32,
}

#[async_trait]
impl ProgressSink for ProgressForwarder {
    async fn on_progress(&self, update: ProgressUpdate) {
        if self.cancel.is_cancelled() {
            return;
        }

        if update.batch.is_none() {
            let last = self.last_epoch.load(Ordering::SeqCst);
            if update.epoch < last {
                tracing::debug!(
                    job_id = %self.job_id,
                    last_epoch = last,
                    update_epoch = update.epoch,
                    "Discarding out-of-order record update"
                );
            } else {
                self.last_epoch.store(update.epoch, Ordering::SeqCst);
                let _ = self
                    .jobs
                    .update(
                        &self.job_id,
                        JobUpdate {
                            current_epoch: Some(update.epoch),
                            progress_percentage: Some(update.progress_percentage),
                            training_loss: update.train_loss,
                            validation_loss: update.val_loss,
                            accuracy: update.val_acc,
                            precision: update.detailed_metrics.map(|m| m.precision),
                            recall: update.detailed_metrics.map(|m| m.recall),
                            f1_score: update.detailed_metrics.map(|m| m.f1_score),
                            ..JobUpdate::default()
                        },
                    )
                    .await;
            }
        }

        // Best-effort side channel; failures are swallowed inside
        self.channel.publish(&update).await;
    }
}
