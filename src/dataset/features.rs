// Feature loading
//
// Drawing files live in external object storage and are decoded upstream;
// training consumes fixed-width feature vectors through this seam.

use std::collections::HashMap;

use crate::errors::{TrainError, TrainResult};

/// Source of decoded per-file feature vectors.
pub trait FeatureSource: Send + Sync {
    /// Load the feature vector for one file reference.
    fn load(&self, file_id: &str) -> TrainResult<Vec<f32>>;

    /// Width of every vector this source produces.
    fn dimension(&self) -> usize;
}

/// Feature source backed by a prefetched map, used by tests and by callers
/// that decode drawings ahead of training.
#[derive(Debug, Default)]
pub struct InMemoryFeatureSource {
    dimension: usize,
    features: HashMap<String, Vec<f32>>,
}

impl InMemoryFeatureSource {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, features: HashMap::new() }
    }

    pub fn insert(&mut self, file_id: impl Into<String>, features: Vec<f32>) {
        self.features.insert(file_id.into(), features);
    }
}

impl FeatureSource for InMemoryFeatureSource {
    fn load(&self, file_id: &str) -> TrainResult<Vec<f32>> {
        self.features
            .get(file_id)
            .cloned()
            .ok_or_else(|| TrainError::Model(format!("no features for file {file_id}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_source_round_trip() {
        let mut source = InMemoryFeatureSource::new(3);
        source.insert("f1", vec![1.0, 2.0, 3.0]);

        assert_eq!(source.load("f1").unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(source.load("missing").is_err());
        assert_eq!(source.dimension(), 3);
    }
}
