// Dataset records, train/validation splitting, feature loading and
// augmentation

mod augment;
mod features;
mod record;
mod split;

pub use augment::{AugmentationConfig, Augmentor};
pub use features::{FeatureSource, InMemoryFeatureSource};
pub use record::{Dataset, DatasetStatus};
pub use split::{prepare_splits, DatasetSplits, SplitSet, TRAIN_FRACTION};
