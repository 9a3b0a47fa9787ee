// Mini-batch loading
//
// Plans an epoch's batches over one split: seeded shuffle for training,
// stored order for validation, and a smaller final batch when the split does
// not divide evenly. A file whose features fail to load contributes a zero
// vector instead of aborting the epoch.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::dataset::{Augmentor, FeatureSource, SplitSet};
use crate::errors::TrainResult;
use crate::models::MiniBatch;

pub struct BatchLoader<'a> {
    samples: Vec<(&'a str, usize)>,
    batch_size: usize,
    shuffle: bool,
    features: &'a dyn FeatureSource,
    augmentor: Option<&'a Augmentor>,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        split: &'a SplitSet,
        batch_size: usize,
        shuffle: bool,
        features: &'a dyn FeatureSource,
        augmentor: Option<&'a Augmentor>,
    ) -> Self {
        let samples = split
            .files
            .iter()
            .filter_map(|id| split.labels.get(id).map(|label| (id.as_str(), *label)))
            .collect();
        Self { samples, batch_size, shuffle, features, augmentor }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn batch_count(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    /// Index plan for one epoch; shuffled per call when enabled.
    pub fn plan_epoch(&self, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.samples.len()).collect();
        if self.shuffle {
            indices.shuffle(rng);
        }
        indices.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }

    /// Materialize one planned batch, applying augmentation when configured.
    pub fn load_batch(&self, indices: &[usize], rng: &mut StdRng) -> TrainResult<MiniBatch> {
        let mut inputs = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());

        for &idx in indices {
            let (file_id, label) = self.samples[idx];
            let mut features = match self.features.load(file_id) {
                Ok(features) => features,
                Err(e) => {
                    tracing::warn!(file_id, error = %e, "Failed to load features, using zero vector");
                    vec![0.0; self.features.dimension()]
                }
            };
            if let Some(augmentor) = self.augmentor {
                augmentor.apply(&mut features, rng);
            }
            inputs.push(features);
            targets.push(label);
        }

        Ok(MiniBatch { inputs, targets })
    }
}
