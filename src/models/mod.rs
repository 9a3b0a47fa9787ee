// Trainable model interface
//
// The orchestrator treats model architectures as a black box behind a
// factory: forward inference for classification, feature extraction for
// similarity search, and flat parameter access for the optimizer and for
// checkpoint snapshots.

mod feedforward;

pub use feedforward::FeedForwardClassifier;

use serde::{Deserialize, Serialize};

use crate::errors::{TrainError, TrainResult};

/// One mini-batch of decoded drawing features and class targets.
#[derive(Debug, Clone)]
pub struct MiniBatch {
    pub inputs: Vec<Vec<f32>>,
    pub targets: Vec<usize>,
}

impl MiniBatch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Model hyperparameters, validated once at job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Architecture selector understood by the model factory
    pub model_type: String,
    /// Width of the decoded feature vectors fed to the model
    pub input_dim: usize,
    /// Width of the embedding produced by feature extraction
    pub feature_dim: usize,
    pub num_classes: usize,
    pub dropout_rate: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: "classifier".to_string(),
            input_dim: 64,
            feature_dim: 128,
            num_classes: 10,
            dropout_rate: 0.5,
            seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> TrainResult<()> {
        if self.input_dim == 0 || self.feature_dim == 0 {
            return Err(TrainError::Configuration(
                "input_dim and feature_dim must be >= 1".to_string(),
            ));
        }
        if self.num_classes < 2 {
            return Err(TrainError::Configuration(format!(
                "num_classes must be >= 2, got {}",
                self.num_classes
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(TrainError::Configuration(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }
}

/// Black-box trainable model.
///
/// `forward` caches activations for the following `backward`; parameters and
/// gradients are exposed as flat vectors so the optimizer and checkpointing
/// stay architecture-agnostic.
pub trait TrainableModel: Send {
    fn forward(&mut self, batch: &MiniBatch) -> TrainResult<Vec<Vec<f32>>>;

    /// Embedding used for similarity search; no activation caching.
    fn extract_features(&self, batch: &MiniBatch) -> TrainResult<Vec<Vec<f32>>>;

    /// Backpropagate loss gradients w.r.t. the logits of the last `forward`.
    fn backward(&mut self, batch: &MiniBatch, grad_logits: &[Vec<f32>]) -> TrainResult<()>;

    /// Toggle train/eval behavior (dropout).
    fn set_training(&mut self, training: bool);

    fn parameters(&self) -> Vec<f32>;

    fn set_parameters(&mut self, params: &[f32]) -> TrainResult<()>;

    fn gradients(&self) -> Vec<f32>;

    fn num_classes(&self) -> usize;
}

/// Creates models from configuration; supplied by the embedding service.
pub trait ModelFactory: Send + Sync {
    fn create(&self, config: &ModelConfig) -> TrainResult<Box<dyn TrainableModel>>;
}

/// Factory for the bundled reference architecture.
#[derive(Debug, Default)]
pub struct DefaultModelFactory;

impl ModelFactory for DefaultModelFactory {
    fn create(&self, config: &ModelConfig) -> TrainResult<Box<dyn TrainableModel>> {
        match config.model_type.as_str() {
            "classifier" | "cnn" | "siamese" => {
                Ok(Box::new(FeedForwardClassifier::new(config)?))
            }
            other => Err(TrainError::Configuration(format!(
                "unsupported model_type: {other}"
            ))),
        }
    }
}

/// Mean cross-entropy over a batch of logits, plus the gradient w.r.t. the
/// logits (softmax minus one-hot, divided by the batch length).
pub fn cross_entropy(logits: &[Vec<f32>], targets: &[usize]) -> (f64, Vec<Vec<f32>>) {
    let batch_len = logits.len().max(1) as f64;
    let mut total_loss = 0.0;
    let mut grads = Vec::with_capacity(logits.len());

    for (row, &target) in logits.iter().zip(targets) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f64> = row.iter().map(|&v| ((v - max) as f64).exp()).collect();
        let sum: f64 = exps.iter().sum();

        let mut grad_row = Vec::with_capacity(row.len());
        for (class, exp) in exps.iter().enumerate() {
            let p = exp / sum;
            let indicator = if class == target { 1.0 } else { 0.0 };
            grad_row.push(((p - indicator) / batch_len) as f32);
            if class == target {
                total_loss -= p.max(1e-12).ln();
            }
        }
        grads.push(grad_row);
    }

    (total_loss / batch_len, grads)
}

/// Predicted class per row: index of the largest logit.
pub fn argmax_predictions(logits: &[Vec<f32>]) -> Vec<usize> {
    logits
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, _)| idx)
                .unwrap_or(0)
        })
        .collect()
}
