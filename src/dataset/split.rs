// Train/validation split construction
//
// Deterministic, order-preserving partition of a dataset's files. Shuffling
// happens inside the batch loader, never here.

use std::collections::{HashMap, HashSet};

use crate::dataset::{Dataset, DatasetStatus};
use crate::errors::{TrainError, TrainResult};

/// Fraction of files assigned to the training split.
pub const TRAIN_FRACTION: f64 = 0.8;

/// One side of a split: files plus the label sub-mapping restricted to them.
#[derive(Debug, Clone)]
pub struct SplitSet {
    pub files: Vec<String>,
    pub labels: HashMap<String, usize>,
}

impl SplitSet {
    fn build(files: Vec<String>, labels: &HashMap<String, usize>) -> Self {
        let restricted = files
            .iter()
            .filter_map(|id| labels.get(id).map(|label| (id.clone(), *label)))
            .collect();
        Self { files, labels: restricted }
    }

    /// Files that carry a label (the ones training can actually consume).
    pub fn labeled_len(&self) -> usize {
        self.files.iter().filter(|id| self.labels.contains_key(*id)).count()
    }

    pub fn class_count(&self) -> usize {
        self.labels.values().collect::<HashSet<_>>().len()
    }
}

#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: SplitSet,
    pub val: SplitSet,
}

/// Partition a ready dataset into ordered 80/20 training and validation
/// splits. Pure function of the dataset record.
pub fn prepare_splits(dataset: &Dataset) -> TrainResult<DatasetSplits> {
    if dataset.status != DatasetStatus::Ready {
        return Err(TrainError::DatasetNotReady {
            dataset_id: dataset.id.clone(),
            reason: format!("status is {:?}", dataset.status),
        });
    }

    let split_index = (dataset.file_ids.len() as f64 * TRAIN_FRACTION) as usize;
    let train_files = dataset.file_ids[..split_index].to_vec();
    let val_files = dataset.file_ids[split_index..].to_vec();

    let train = SplitSet::build(train_files, &dataset.labels);
    let val = SplitSet::build(val_files, &dataset.labels);

    if train.labeled_len() == 0 {
        return Err(TrainError::Configuration(
            "training split has no labeled files; cannot form a batch".to_string(),
        ));
    }
    if train.class_count() < 2 {
        return Err(TrainError::Configuration(format!(
            "training split has {} class(es); at least 2 are required",
            train.class_count()
        )));
    }
    if val.labeled_len() == 0 {
        return Err(TrainError::Configuration(
            "validation split has no labeled files".to_string(),
        ));
    }

    Ok(DatasetSplits { train, val })
}
