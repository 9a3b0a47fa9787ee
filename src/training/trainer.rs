// Epoch trainer
//
// Drives the optimization loop for one training job: randomized mini-batch
// training, full validation, plateau-based learning-rate adjustment,
// best-snapshot tracking with early stopping, and per-epoch checkpointing.
// Cancellation is cooperative and observed between epochs.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::dataset::{Augmentor, DatasetSplits, FeatureSource};
use crate::errors::{TrainError, TrainResult};
use crate::models::{argmax_predictions, cross_entropy, MiniBatch, ModelConfig, TrainableModel};
use crate::progress::{BatchProgress, ProgressSink, ProgressUpdate};
use crate::training::{
    parameter_checksum, Adam, BatchLoader, CheckpointManager, EpochRecord, FinalArtifact,
    ReduceLrOnPlateau, TrainingCheckpoint, TrainingConfig, TrainingHistory, ValidationMetrics,
};

/// Why the epoch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EpochsExhausted,
    EarlyStopped { at_epoch: u32 },
}

/// Result of a completed (not cancelled) training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub epochs_trained: u32,
    pub training_time_secs: f64,
    pub final_train_loss: f64,
    pub final_train_acc: f64,
    pub final_val_loss: f64,
    pub final_val_acc: f64,
    pub best_val_loss: f64,
    pub detailed_metrics: ValidationMetrics,
    pub model_path: std::path::PathBuf,
    pub history: TrainingHistory,
    pub stop: StopReason,
}

#[derive(Debug)]
pub enum EpochLoopExit {
    Completed(Box<TrainingReport>),
    Cancelled { epochs_run: u32 },
}

pub struct EpochTrainer {
    job_id: String,
    model: Box<dyn TrainableModel>,
    optimizer: Adam,
    scheduler: ReduceLrOnPlateau,
    model_config: ModelConfig,
    training_config: TrainingConfig,
    checkpoints: CheckpointManager,
    progress: Arc<dyn ProgressSink>,
    progress_batch_interval: usize,
    rng: StdRng,

    current_epoch: u32,
    best_val_loss: f64,
    best_parameters: Option<Vec<f32>>,
    early_stopping_counter: u32,
    history: TrainingHistory,
}

impl EpochTrainer {
    pub fn new(
        job_id: impl Into<String>,
        model: Box<dyn TrainableModel>,
        model_config: ModelConfig,
        training_config: TrainingConfig,
        checkpoints: CheckpointManager,
        progress: Arc<dyn ProgressSink>,
        progress_batch_interval: usize,
    ) -> Self {
        let param_count = model.parameters().len();
        let optimizer = Adam::new(param_count, training_config.weight_decay);
        let scheduler = ReduceLrOnPlateau::new(
            training_config.learning_rate,
            training_config.scheduler_factor,
            training_config.scheduler_patience,
        );
        let rng = StdRng::seed_from_u64(training_config.seed);

        Self {
            job_id: job_id.into(),
            model,
            optimizer,
            scheduler,
            model_config,
            training_config,
            checkpoints,
            progress,
            progress_batch_interval: progress_batch_interval.max(1),
            rng,
            current_epoch: 0,
            best_val_loss: f64::INFINITY,
            best_parameters: None,
            early_stopping_counter: 0,
            history: TrainingHistory::new(),
        }
    }

    /// History collected so far; available for diagnostics after a failure.
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn current_epoch(&self) -> u32 {
        self.current_epoch
    }

    /// Run the full epoch loop over the prepared splits.
    pub async fn train(
        &mut self,
        splits: &DatasetSplits,
        features: &dyn FeatureSource,
        cancel: &CancellationToken,
    ) -> TrainResult<EpochLoopExit> {
        let start = Instant::now();
        let total_epochs = self.training_config.epochs;
        let augmentor = Augmentor::new(self.training_config.augmentation.clone());

        let train_loader = BatchLoader::new(
            &splits.train,
            self.training_config.batch_size,
            true,
            features,
            Some(&augmentor),
        );
        let val_loader = BatchLoader::new(
            &splits.val,
            self.training_config.batch_size,
            false,
            features,
            None,
        );

        tracing::info!(
            job_id = %self.job_id,
            train_samples = train_loader.sample_count(),
            val_samples = val_loader.sample_count(),
            epochs = total_epochs,
            "Starting training"
        );

        for epoch in 0..total_epochs {
            if cancel.is_cancelled() {
                tracing::info!(job_id = %self.job_id, epoch, "Training cancelled");
                return Ok(EpochLoopExit::Cancelled { epochs_run: epoch });
            }
            self.current_epoch = epoch;

            let (train_loss, train_acc) = self.train_epoch(&train_loader).await?;
            let (val_loss, val_acc, detailed) = self.validate_epoch(&val_loader)?;

            let learning_rate = self.scheduler.step(val_loss);

            self.history.push(EpochRecord {
                epoch,
                train_loss,
                val_loss,
                train_acc,
                val_acc,
                learning_rate,
            });

            let is_best = val_loss < self.best_val_loss;
            if is_best {
                self.best_val_loss = val_loss;
                self.best_parameters = Some(self.model.parameters());
                self.early_stopping_counter = 0;
            } else {
                self.early_stopping_counter += 1;
            }

            // Recovery checkpoint every epoch; failure here loses the
            // checkpoint, not the job
            if let Err(e) = self.save_checkpoint(epoch, is_best) {
                tracing::warn!(job_id = %self.job_id, epoch, error = %e, "Checkpoint write failed");
            }

            self.progress
                .on_progress(ProgressUpdate::epoch(
                    self.job_id.clone(),
                    epoch,
                    total_epochs,
                    train_loss,
                    val_loss,
                    train_acc,
                    val_acc,
                    learning_rate,
                    detailed,
                ))
                .await;

            tracing::info!(
                job_id = %self.job_id,
                epoch,
                total_epochs,
                train_loss,
                train_acc,
                val_loss,
                val_acc,
                learning_rate,
                "Epoch complete"
            );

            if self.early_stopping_counter >= self.training_config.patience {
                tracing::info!(
                    job_id = %self.job_id,
                    epoch,
                    patience = self.training_config.patience,
                    "Early stopping triggered"
                );
                return self
                    .finish(start, StopReason::EarlyStopped { at_epoch: epoch }, &val_loader)
                    .map(|report| EpochLoopExit::Completed(Box::new(report)));
            }
        }

        self.finish(start, StopReason::EpochsExhausted, &val_loader)
            .map(|report| EpochLoopExit::Completed(Box::new(report)))
    }

    /// One optimization pass over the training split.
    async fn train_epoch(&mut self, loader: &BatchLoader<'_>) -> TrainResult<(f64, f64)> {
        self.model.set_training(true);

        let plan = loader.plan_epoch(&mut self.rng);
        let total_batches = plan.len();
        let mut loss_sum = 0.0;
        let mut finite_batches = 0usize;
        let mut consecutive_nan = 0u32;
        let mut all_targets = Vec::new();
        let mut all_predictions = Vec::new();

        for (batch_idx, indices) in plan.iter().enumerate() {
            let batch = loader.load_batch(indices, &mut self.rng)?;
            let logits = self.model.forward(&batch)?;
            let (loss, grad_logits) = cross_entropy(&logits, &batch.targets);

            if !loss.is_finite() {
                consecutive_nan += 1;
                if consecutive_nan > 1 {
                    return Err(TrainError::TrainingDiverged {
                        epoch: self.current_epoch,
                        batch: batch_idx,
                    });
                }
                tracing::warn!(
                    job_id = %self.job_id,
                    epoch = self.current_epoch,
                    batch = batch_idx,
                    "Non-finite batch loss, skipping optimizer step"
                );
                continue;
            }
            consecutive_nan = 0;

            self.model.backward(&batch, &grad_logits)?;
            let mut params = self.model.parameters();
            let grads = self.model.gradients();
            self.optimizer
                .step(&mut params, &grads, self.scheduler.learning_rate());
            self.model.set_parameters(&params)?;

            loss_sum += loss;
            finite_batches += 1;
            all_predictions.extend(argmax_predictions(&logits));
            all_targets.extend_from_slice(&batch.targets);

            if batch_idx % self.progress_batch_interval == 0 {
                self.progress
                    .on_progress(ProgressUpdate::batch(
                        self.job_id.clone(),
                        self.current_epoch,
                        self.training_config.epochs,
                        BatchProgress {
                            batch: batch_idx,
                            total_batches,
                            percent: (batch_idx as f64 / total_batches.max(1) as f64) * 100.0,
                            loss,
                        },
                    ))
                    .await;
            }
        }

        // Epoch loss is the mean of per-batch means
        let avg_loss = loss_sum / finite_batches.max(1) as f64;
        let accuracy = super::accuracy(&all_targets, &all_predictions);
        Ok((avg_loss, accuracy))
    }

    /// One pass over the validation split, no gradient updates.
    fn validate_epoch(
        &mut self,
        loader: &BatchLoader<'_>,
    ) -> TrainResult<(f64, f64, ValidationMetrics)> {
        self.model.set_training(false);

        let plan = loader.plan_epoch(&mut self.rng);
        let total_batches = plan.len();
        let mut loss_sum = 0.0;
        let mut all_targets = Vec::new();
        let mut all_predictions = Vec::new();

        for indices in &plan {
            let batch = loader.load_batch(indices, &mut self.rng)?;
            let logits = self.model.forward(&batch)?;
            let (loss, _) = cross_entropy(&logits, &batch.targets);

            loss_sum += loss;
            all_predictions.extend(argmax_predictions(&logits));
            all_targets.extend_from_slice(&batch.targets);
        }

        let avg_loss = loss_sum / total_batches.max(1) as f64;
        let accuracy = super::accuracy(&all_targets, &all_predictions);
        let detailed = super::weighted_precision_recall_f1(&all_targets, &all_predictions);
        Ok((avg_loss, accuracy, detailed))
    }

    fn save_checkpoint(&self, epoch: u32, is_best: bool) -> TrainResult<()> {
        let parameters = self.model.parameters();
        let checkpoint = TrainingCheckpoint {
            epoch,
            timestamp: Utc::now(),
            checksum: parameter_checksum(&parameters),
            parameters,
            optimizer: self.optimizer.state(),
            scheduler: self.scheduler.state(),
            best_val_loss: self.best_val_loss,
            history: self.history.clone(),
            model_config: self.model_config.clone(),
            training_config: self.training_config.clone(),
        };
        self.checkpoints.save_epoch(&checkpoint, is_best)
    }

    /// Restore from a recovery checkpoint.
    pub fn load_checkpoint(&mut self, epoch: u32) -> TrainResult<()> {
        let checkpoint = self.checkpoints.load_epoch(epoch)?;
        self.model.set_parameters(&checkpoint.parameters)?;
        self.optimizer.restore(checkpoint.optimizer);
        self.scheduler.restore(checkpoint.scheduler);
        self.current_epoch = checkpoint.epoch;
        self.best_val_loss = checkpoint.best_val_loss;
        self.history = checkpoint.history;
        Ok(())
    }

    /// Restore the best snapshot, re-validate with it and persist the final
    /// artifact. Failure to write the final artifact is fatal for the job.
    fn finish(
        &mut self,
        start: Instant,
        stop: StopReason,
        val_loader: &BatchLoader<'_>,
    ) -> TrainResult<TrainingReport> {
        if let Some(best) = self.best_parameters.take() {
            self.model.set_parameters(&best)?;
        }

        let (final_val_loss, final_val_acc, detailed) = self.validate_epoch(val_loader)?;

        let parameters = self.model.parameters();
        let artifact = FinalArtifact {
            checksum: parameter_checksum(&parameters),
            parameters,
            model_config: self.model_config.clone(),
            training_config: self.training_config.clone(),
            history: self.history.clone(),
            created_at: Utc::now(),
        };
        let model_path = self.checkpoints.save_final(&artifact)?;

        let last = self.history.last();
        let report = TrainingReport {
            epochs_trained: self.current_epoch + 1,
            training_time_secs: start.elapsed().as_secs_f64(),
            final_train_loss: last.map_or(0.0, |r| r.train_loss),
            final_train_acc: last.map_or(0.0, |r| r.train_acc),
            final_val_loss,
            final_val_acc,
            best_val_loss: self.best_val_loss,
            detailed_metrics: detailed,
            model_path,
            history: self.history.clone(),
            stop,
        };

        tracing::info!(
            job_id = %self.job_id,
            epochs_trained = report.epochs_trained,
            training_time_secs = report.training_time_secs,
            best_val_loss = report.best_val_loss,
            final_val_acc = report.final_val_acc,
            "Training completed"
        );
        Ok(report)
    }

    /// Persist collected history next to the checkpoints after a failure.
    pub fn save_partial_history(&self) -> TrainResult<std::path::PathBuf> {
        self.checkpoints.save_partial_history(&self.history)
    }

    /// Embedding for a batch with the current parameters.
    pub fn extract_features(&self, batch: &MiniBatch) -> TrainResult<Vec<Vec<f32>>> {
        self.model.extract_features(batch)
    }
}
