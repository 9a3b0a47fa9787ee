// Bundled reference architecture
//
// Two-layer network: input -> embedding (ReLU, inverted dropout) ->
// class logits. The embedding layer doubles as the feature-extraction
// output. Parameters are stored flat so the optimizer and checkpoints can
// treat every architecture the same way.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{TrainError, TrainResult};
use crate::models::{MiniBatch, ModelConfig, TrainableModel};

pub struct FeedForwardClassifier {
    input_dim: usize,
    feature_dim: usize,
    num_classes: usize,
    dropout_rate: f32,
    training: bool,
    /// Layout: [w1 (feature_dim x input_dim), b1, w2 (num_classes x feature_dim), b2]
    params: Vec<f32>,
    grads: Vec<f32>,
    rng: StdRng,
    // Cached activations from the last forward pass
    last_hidden: Vec<Vec<f32>>,
    last_mask: Vec<Vec<f32>>,
}

impl FeedForwardClassifier {
    pub fn new(config: &ModelConfig) -> TrainResult<Self> {
        config.validate()?;

        let input_dim = config.input_dim;
        let feature_dim = config.feature_dim;
        let num_classes = config.num_classes;
        let param_count = feature_dim * input_dim + feature_dim + num_classes * feature_dim + num_classes;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let scale1 = (2.0 / input_dim as f64).sqrt() as f32;
        let scale2 = (2.0 / feature_dim as f64).sqrt() as f32;

        let mut params = vec![0.0f32; param_count];
        let (w1_len, b1_len) = (feature_dim * input_dim, feature_dim);
        let w2_len = num_classes * feature_dim;
        for value in &mut params[..w1_len] {
            *value = rng.gen_range(-1.0..=1.0) * scale1;
        }
        for value in &mut params[w1_len + b1_len..w1_len + b1_len + w2_len] {
            *value = rng.gen_range(-1.0..=1.0) * scale2;
        }

        Ok(Self {
            input_dim,
            feature_dim,
            num_classes,
            dropout_rate: config.dropout_rate as f32,
            training: false,
            grads: vec![0.0; params.len()],
            params,
            rng,
            last_hidden: Vec::new(),
            last_mask: Vec::new(),
        })
    }

    fn check_batch(&self, batch: &MiniBatch) -> TrainResult<()> {
        for row in &batch.inputs {
            if row.len() != self.input_dim {
                return Err(TrainError::Model(format!(
                    "expected input width {}, got {}",
                    self.input_dim,
                    row.len()
                )));
            }
        }
        Ok(())
    }

    fn offsets(&self) -> (usize, usize, usize) {
        let w1 = self.feature_dim * self.input_dim;
        let b1 = w1 + self.feature_dim;
        let w2 = b1 + self.num_classes * self.feature_dim;
        (w1, b1, w2)
    }

    fn hidden(&self, input: &[f32]) -> Vec<f32> {
        let (w1_end, _, _) = self.offsets();
        let w1 = &self.params[..w1_end];
        let b1 = &self.params[w1_end..w1_end + self.feature_dim];

        (0..self.feature_dim)
            .map(|j| {
                let row = &w1[j * self.input_dim..(j + 1) * self.input_dim];
                let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                (sum + b1[j]).max(0.0)
            })
            .collect()
    }

    fn logits_from_hidden(&self, hidden: &[f32]) -> Vec<f32> {
        let (_, b1_end, w2_end) = self.offsets();
        let w2 = &self.params[b1_end..w2_end];
        let b2 = &self.params[w2_end..];

        (0..self.num_classes)
            .map(|k| {
                let row = &w2[k * self.feature_dim..(k + 1) * self.feature_dim];
                let sum: f32 = row.iter().zip(hidden).map(|(w, h)| w * h).sum();
                sum + b2[k]
            })
            .collect()
    }
}

impl TrainableModel for FeedForwardClassifier {
    fn forward(&mut self, batch: &MiniBatch) -> TrainResult<Vec<Vec<f32>>> {
        self.check_batch(batch)?;

        self.last_hidden.clear();
        self.last_mask.clear();
        let keep = 1.0 - self.dropout_rate;

        let mut logits = Vec::with_capacity(batch.len());
        for input in &batch.inputs {
            let mut hidden = self.hidden(input);
            let mask: Vec<f32> = if self.training && self.dropout_rate > 0.0 {
                hidden
                    .iter()
                    .map(|_| if self.rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
                    .collect()
            } else {
                vec![1.0; hidden.len()]
            };
            for (h, m) in hidden.iter_mut().zip(&mask) {
                *h *= m;
            }

            logits.push(self.logits_from_hidden(&hidden));
            self.last_hidden.push(hidden);
            self.last_mask.push(mask);
        }
        Ok(logits)
    }

    fn extract_features(&self, batch: &MiniBatch) -> TrainResult<Vec<Vec<f32>>> {
        self.check_batch(batch)?;
        Ok(batch.inputs.iter().map(|input| self.hidden(input)).collect())
    }

    fn backward(&mut self, batch: &MiniBatch, grad_logits: &[Vec<f32>]) -> TrainResult<()> {
        if grad_logits.len() != self.last_hidden.len() {
            return Err(TrainError::Model(
                "backward called without a matching forward pass".to_string(),
            ));
        }

        let (w1_end, b1_end, w2_end) = self.offsets();
        self.grads.iter_mut().for_each(|g| *g = 0.0);

        for ((input, hidden), (mask, grad_row)) in batch
            .inputs
            .iter()
            .zip(&self.last_hidden)
            .zip(self.last_mask.iter().zip(grad_logits))
        {
            // Output layer gradients
            for (k, &g_out) in grad_row.iter().enumerate() {
                let w2_row = b1_end + k * self.feature_dim;
                for (j, &h) in hidden.iter().enumerate() {
                    self.grads[w2_row + j] += g_out * h;
                }
                self.grads[w2_end + k] += g_out;
            }

            // Hidden layer gradients through ReLU and the dropout mask
            for j in 0..self.feature_dim {
                if hidden[j] <= 0.0 {
                    continue;
                }
                let mut g_hidden = 0.0f32;
                for (k, &g_out) in grad_row.iter().enumerate() {
                    g_hidden += g_out * self.params[b1_end + k * self.feature_dim + j];
                }
                g_hidden *= mask[j];

                let w1_row = j * self.input_dim;
                for (i, &x) in input.iter().enumerate() {
                    self.grads[w1_row + i] += g_hidden * x;
                }
                self.grads[w1_end + j] += g_hidden;
            }
        }
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn parameters(&self) -> Vec<f32> {
        self.params.clone()
    }

    fn set_parameters(&mut self, params: &[f32]) -> TrainResult<()> {
        if params.len() != self.params.len() {
            return Err(TrainError::Model(format!(
                "parameter snapshot has {} values, model expects {}",
                params.len(),
                self.params.len()
            )));
        }
        self.params.copy_from_slice(params);
        Ok(())
    }

    fn gradients(&self) -> Vec<f32> {
        self.grads.clone()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
