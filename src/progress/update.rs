// Progress notification payloads
//
// Batch-level notifications are a lightweight subset (epoch, intra-epoch
// position, current loss); epoch-level notifications carry the full metric
// set and are the ones applied to the durable job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::training::ValidationMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch: usize,
    pub total_batches: usize,
    /// Position within the current epoch, 0-100
    pub percent: f64,
    pub loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: String,
    pub epoch: u32,
    pub total_epochs: u32,
    /// Present only on batch-level notifications
    pub batch: Option<BatchProgress>,
    /// Cumulative progress across the whole job, 0-100
    pub progress_percentage: f64,
    pub train_loss: Option<f64>,
    pub val_loss: Option<f64>,
    pub train_acc: Option<f64>,
    pub val_acc: Option<f64>,
    pub learning_rate: Option<f64>,
    pub detailed_metrics: Option<ValidationMetrics>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    /// Lightweight intra-epoch notification.
    pub fn batch(
        job_id: impl Into<String>,
        epoch: u32,
        total_epochs: u32,
        batch: BatchProgress,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            epoch,
            total_epochs,
            // Completed epochs only; the running epoch reports through `batch`
            progress_percentage: (f64::from(epoch) / f64::from(total_epochs.max(1))) * 100.0,
            batch: Some(batch),
            train_loss: None,
            val_loss: None,
            train_acc: None,
            val_acc: None,
            learning_rate: None,
            detailed_metrics: None,
            timestamp: Utc::now(),
        }
    }

    /// Full end-of-epoch notification.
    #[allow(clippy::too_many_arguments)]
    pub fn epoch(
        job_id: impl Into<String>,
        epoch: u32,
        total_epochs: u32,
        train_loss: f64,
        val_loss: f64,
        train_acc: f64,
        val_acc: f64,
        learning_rate: f64,
        detailed_metrics: ValidationMetrics,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            epoch,
            total_epochs,
            batch: None,
            progress_percentage: (f64::from(epoch + 1) / f64::from(total_epochs.max(1))) * 100.0,
            train_loss: Some(train_loss),
            val_loss: Some(val_loss),
            train_acc: Some(train_acc),
            val_acc: Some(val_acc),
            learning_rate: Some(learning_rate),
            detailed_metrics: Some(detailed_metrics),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_update_progress_percentage() {
        let update = ProgressUpdate::epoch(
            "job-1", 4, 10, 0.5, 0.6, 0.8, 0.75, 0.001,
            ValidationMetrics::default(),
        );
        assert!((update.progress_percentage - 50.0).abs() < 1e-9);
        assert!(update.batch.is_none());
        assert_eq!(update.val_loss, Some(0.6));
    }

    #[test]
    fn test_batch_update_is_lightweight() {
        let update = ProgressUpdate::batch(
            "job-1",
            2,
            10,
            BatchProgress { batch: 5, total_batches: 20, percent: 25.0, loss: 0.9 },
        );
        assert!(update.train_loss.is_none());
        assert!(update.detailed_metrics.is_none());
        assert_eq!(update.batch.unwrap().batch, 5);
    }
}
