// Record stores
//
// CRUD seams onto the durable job/dataset/model records. The relational
// database behind them is an external collaborator; the bundled in-memory
// implementations back tests and embedded use.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::dataset::Dataset;
use crate::errors::TrainResult;
use crate::jobs::{AIModel, JobUpdate, TrainingJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: TrainingJob) -> TrainResult<String>;

    async fn get(&self, id: &str) -> Option<TrainingJob>;

    /// Apply a partial update, returning the updated record. Yields `None`
    /// for an absent id. Non-status updates against a terminal record are
    /// ignored: terminal records are never mutated by progress propagation.
    async fn update(&self, id: &str, update: JobUpdate) -> Option<TrainingJob>;

    async fn delete(&self, id: &str) -> bool;
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Dataset>;
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn create(&self, model: AIModel) -> TrainResult<AIModel>;

    async fn get(&self, id: &str) -> Option<AIModel>;

    async fn list_for_job(&self, job_id: &str) -> Vec<AIModel>;

    /// Mark one model as the default for its type, clearing the previous
    /// default. At most one default per model_type exists at any time.
    async fn set_default(&self, id: &str) -> bool;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<String, TrainingJob>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: TrainingJob) -> TrainResult<String> {
        let id = job.id.clone();
        self.jobs.insert(id.clone(), job);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Option<TrainingJob> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Option<TrainingJob> {
        let mut entry = self.jobs.get_mut(id)?;
        if entry.status.is_terminal() && update.status.is_none() {
            return Some(entry.value().clone());
        }
        update.apply(entry.value_mut());
        Some(entry.value().clone())
    }

    async fn delete(&self, id: &str) -> bool {
        self.jobs.remove(id).is_some()
    }
}

#[derive(Default)]
pub struct InMemoryDatasetStore {
    datasets: DashMap<String, Dataset>,
}

impl InMemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, dataset: Dataset) -> String {
        let id = dataset.id.clone();
        self.datasets.insert(id.clone(), dataset);
        id
    }
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    async fn get(&self, id: &str) -> Option<Dataset> {
        self.datasets.get(id).map(|entry| entry.value().clone())
    }
}

#[derive(Default)]
pub struct InMemoryModelStore {
    models: DashMap<String, AIModel>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn create(&self, model: AIModel) -> TrainResult<AIModel> {
        self.models.insert(model.id.clone(), model.clone());
        Ok(model)
    }

    async fn get(&self, id: &str) -> Option<AIModel> {
        self.models.get(id).map(|entry| entry.value().clone())
    }

    async fn list_for_job(&self, job_id: &str) -> Vec<AIModel> {
        self.models
            .iter()
            .filter(|entry| entry.value().training_job_id == job_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn set_default(&self, id: &str) -> bool {
        let model_type = match self.models.get(id) {
            Some(entry) => entry.value().model_type.clone(),
            None => return false,
        };

        for mut entry in self.models.iter_mut() {
            if entry.value().model_type == model_type {
                entry.value_mut().is_default = false;
            }
        }
        if let Some(mut entry) = self.models.get_mut(id) {
            entry.value_mut().is_default = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, TrainingJobRequest};
    use crate::models::ModelConfig;
    use crate::training::{TrainingConfig, ValidationMetrics};
    use chrono::Utc;

    fn job() -> TrainingJob {
        TrainingJob::new(&TrainingJobRequest {
            name: "j".to_string(),
            dataset_id: "ds".to_string(),
            model_config: ModelConfig::default(),
            training_config: TrainingConfig::default(),
            created_by: "user-1".to_string(),
        })
    }

    fn model(id: &str, model_type: &str) -> AIModel {
        AIModel {
            id: id.to_string(),
            name: format!("model {id}"),
            description: None,
            version: "1.0.0".to_string(),
            model_type: model_type.to_string(),
            training_job_id: "job-1".to_string(),
            training_dataset_id: "ds-1".to_string(),
            model_path: "final_model.json".into(),
            config: ModelConfig::default(),
            accuracy: Some(0.9),
            performance: ValidationMetrics::default(),
            is_default: false,
            status: "active".to_string(),
            created_by: "user-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_update_absent_id_returns_none() {
        let store = InMemoryJobStore::new();
        let result = store.update("missing", JobUpdate::default()).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_progress_update_against_terminal_record_is_ignored() {
        let store = InMemoryJobStore::new();
        let mut record = job();
        record.status = JobStatus::Cancelled;
        let id = store.create(record).await.unwrap();

        let after = store
            .update(&id, JobUpdate { current_epoch: Some(7), ..JobUpdate::default() })
            .await
            .unwrap();
        assert_eq!(after.current_epoch, 0);
        assert_eq!(after.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_set_default_clears_previous_default() {
        let store = InMemoryModelStore::new();
        store.create(model("m1", "classifier")).await.unwrap();
        store.create(model("m2", "classifier")).await.unwrap();
        store.create(model("m3", "siamese")).await.unwrap();

        assert!(store.set_default("m1").await);
        assert!(store.set_default("m2").await);
        assert!(store.set_default("m3").await);

        let defaults: Vec<String> = ["m1", "m2", "m3"]
            .iter()
            .filter_map(|id| store.models.get(*id))
            .filter(|entry| entry.value().is_default)
            .map(|entry| entry.value().id.clone())
            .collect();
        assert_eq!(defaults.len(), 2);
        assert!(defaults.contains(&"m2".to_string()));
        assert!(defaults.contains(&"m3".to_string()));
    }

    #[tokio::test]
    async fn test_list_for_job() {
        let store = InMemoryModelStore::new();
        store.create(model("m1", "classifier")).await.unwrap();
        assert_eq!(store.list_for_job("job-1").await.len(), 1);
        assert!(store.list_for_job("job-2").await.is_empty());
    }
}
