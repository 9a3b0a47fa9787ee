// Job lifecycle, stores, background runner and the training orchestrator

mod orchestrator;
mod record;
mod runner;
mod status;
mod store;

pub use orchestrator::{TrainingOrchestrator, TrainingOutcome, TrainingProgress};
pub use record::{AIModel, JobUpdate, TrainingJob, TrainingJobRequest};
pub use runner::{BoxedTask, TaskHandle, TaskRunner, TokioTaskRunner};
pub use status::JobStatus;
pub use store::{
    DatasetStore, InMemoryDatasetStore, InMemoryJobStore, InMemoryModelStore, JobStore, ModelStore,
};
