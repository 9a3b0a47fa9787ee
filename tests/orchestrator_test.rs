// End-to-end orchestrator tests: lifecycle scenarios, cancellation,
// rejected transitions and progress propagation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use cadet::config::Settings;
use cadet::dataset::{
    AugmentationConfig, Dataset, DatasetStatus, FeatureSource, InMemoryFeatureSource,
};
use cadet::errors::{TrainError, TrainResult};
use cadet::jobs::{
    InMemoryDatasetStore, InMemoryJobStore, InMemoryModelStore, JobStatus, JobStore, ModelStore,
    TokioTaskRunner, TrainingJobRequest, TrainingOrchestrator,
};
use cadet::models::{DefaultModelFactory, ModelConfig};
use cadet::progress::{InMemoryProgressCache, ProgressCache};
use cadet::training::TrainingConfig;

struct Harness {
    orchestrator: Arc<TrainingOrchestrator>,
    jobs: Arc<InMemoryJobStore>,
    datasets: Arc<InMemoryDatasetStore>,
    models: Arc<InMemoryModelStore>,
    cache: Arc<InMemoryProgressCache>,
    _storage_dir: TempDir,
}

fn separable_features(files: usize) -> InMemoryFeatureSource {
    let mut source = InMemoryFeatureSource::new(4);
    for i in 0..files {
        let base: [f32; 4] = if i % 2 == 0 { [1.0, 0.0, 1.0, 0.0] } else { [0.0, 1.0, 0.0, 1.0] };
        let jitter = i as f32 * 0.01;
        source.insert(format!("f{}", i + 1), base.iter().map(|v| v + jitter).collect());
    }
    source
}

fn separable_dataset(files: usize) -> Dataset {
    let file_ids: Vec<String> = (1..=files).map(|i| format!("f{i}")).collect();
    let labels: HashMap<String, usize> = file_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i % 2))
        .collect();
    Dataset::new("floor plans", file_ids, labels, "user-1")
}

fn harness_with_features(features: Arc<dyn FeatureSource>) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cadet=info")
        .try_init();

    let storage_dir = TempDir::new().unwrap();
    let settings = Settings {
        model_storage_path: storage_dir.path().to_path_buf(),
        ..Settings::default()
    };

    let jobs = Arc::new(InMemoryJobStore::new());
    let datasets = Arc::new(InMemoryDatasetStore::new());
    let models = Arc::new(InMemoryModelStore::new());
    let cache = Arc::new(InMemoryProgressCache::new());
    let artifacts = Arc::new(cadet::storage::FsArtifactStorage::new(
        settings.model_storage_path.clone(),
    ));
    let runner = Arc::new(TokioTaskRunner::new(settings.training_timeout()));

    let orchestrator = Arc::new(TrainingOrchestrator::new(
        settings,
        Arc::clone(&jobs) as Arc<dyn JobStore>,
        Arc::clone(&datasets) as Arc<dyn cadet::jobs::DatasetStore>,
        Arc::clone(&models) as Arc<dyn ModelStore>,
        artifacts,
        Arc::new(DefaultModelFactory),
        features,
        Arc::clone(&cache) as Arc<dyn ProgressCache>,
        runner,
    ));

    Harness { orchestrator, jobs, datasets, models, cache, _storage_dir: storage_dir }
}

fn harness(files: usize) -> Harness {
    harness_with_features(Arc::new(separable_features(files)))
}

fn request(dataset_id: &str, epochs: u32) -> TrainingJobRequest {
    TrainingJobRequest {
        name: "floor plan classifier".to_string(),
        dataset_id: dataset_id.to_string(),
        model_config: ModelConfig {
            input_dim: 4,
            feature_dim: 8,
            num_classes: 2,
            dropout_rate: 0.0,
            ..ModelConfig::default()
        },
        training_config: TrainingConfig {
            epochs,
            batch_size: 4,
            learning_rate: 0.05,
            augmentation: AugmentationConfig::disabled(),
            ..TrainingConfig::default()
        },
        created_by: "user-1".to_string(),
    }
}

async fn run_job(
    harness: &Harness,
    job: &cadet::jobs::TrainingJob,
) -> TrainResult<cadet::jobs::TrainingOutcome> {
    harness
        .orchestrator
        .run(
            &job.id,
            &job.dataset_id,
            job.model_config.clone(),
            job.training_config.clone(),
            &job.created_by,
        )
        .await
}

#[tokio::test]
async fn test_successful_run_completes_and_creates_one_model() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness.orchestrator.create_job(request(&dataset_id, 3)).await.unwrap();
    let outcome = run_job(&harness, &job).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Completed);
    let model_id = outcome.model_id.expect("model record created");

    // Exactly one model, referencing this job
    assert_eq!(harness.models.len(), 1);
    let model = harness.models.get(&model_id).await.unwrap();
    assert_eq!(model.training_job_id, job.id);
    assert_eq!(model.training_dataset_id, dataset_id);

    let record = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress_percentage, 100.0);
    assert_eq!(record.current_epoch, 2);
    assert!(record.model_path.as_ref().unwrap().ends_with("final_model.json"));
    assert!(record.error_message.is_none());
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.accuracy.is_some());

    let report = outcome.report.unwrap();
    assert_eq!(report.epochs_trained, 3);
    assert_eq!(report.history.len(), 3);
}

#[tokio::test]
async fn test_cancel_while_queued_yields_cancelled_without_model() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness.orchestrator.create_job(request(&dataset_id, 3)).await.unwrap();
    assert!(harness.orchestrator.cancel(&job.id).await.unwrap());

    let record = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert!(harness.models.is_empty());

    // A late pickup of the cancelled job is a quiet no-op, not an error
    let outcome = run_job(&harness, &job).await.unwrap();
    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert!(outcome.model_id.is_none());
    assert!(harness.models.is_empty());
    assert_eq!(harness.jobs.get(&job.id).await.unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_not_ready_dataset_fails_before_running() {
    let harness = harness(20);
    let mut dataset = separable_dataset(20);
    dataset.status = DatasetStatus::Processing;
    let dataset_id = harness.datasets.insert(dataset);

    let job = harness.orchestrator.create_job(request(&dataset_id, 3)).await.unwrap();
    let err = run_job(&harness, &job).await.unwrap_err();
    assert!(matches!(err, TrainError::DatasetNotReady { .. }));

    let record = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_message.as_ref().unwrap().contains("not ready"));
    // Never marked running
    assert!(record.started_at.is_none());
    assert!(harness.models.is_empty());
}

#[tokio::test]
async fn test_missing_dataset_fails_the_job() {
    let harness = harness(20);
    let job = harness.orchestrator.create_job(request("absent", 3)).await.unwrap();

    let err = run_job(&harness, &job).await.unwrap_err();
    assert!(matches!(err, TrainError::DatasetNotReady { .. }));
    let record = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_rejected_transition_leaves_record_unchanged() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness.orchestrator.create_job(request(&dataset_id, 2)).await.unwrap();
    run_job(&harness, &job).await.unwrap();

    let before = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(before.status, JobStatus::Completed);

    let err = harness.orchestrator.cancel(&job.id).await.unwrap_err();
    assert!(matches!(
        err,
        TrainError::InvalidStateTransition { from: JobStatus::Completed, to: JobStatus::Cancelled }
    ));

    let after = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_double_cancel_is_rejected() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness.orchestrator.create_job(request(&dataset_id, 3)).await.unwrap();
    harness.orchestrator.cancel(&job.id).await.unwrap();

    let before = harness.jobs.get(&job.id).await.unwrap();
    let err = harness.orchestrator.cancel(&job.id).await.unwrap_err();
    assert!(matches!(err, TrainError::InvalidStateTransition { .. }));
    let after = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_cancel_unknown_job_is_not_found() {
    let harness = harness(20);
    let err = harness.orchestrator.cancel("no-such-job").await.unwrap_err();
    assert!(matches!(err, TrainError::JobNotFound(_)));
}

#[tokio::test]
async fn test_invalid_training_config_is_rejected_at_creation() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let mut bad = request(&dataset_id, 3);
    bad.training_config.epochs = 0;
    let err = harness.orchestrator.create_job(bad).await.unwrap_err();
    assert!(matches!(err, TrainError::Configuration(_)));
}

/// Feature source that blocks until released, pinning a run inside its
/// first epoch.
struct GatedFeatureSource {
    inner: InMemoryFeatureSource,
    release: Arc<AtomicBool>,
}

impl FeatureSource for GatedFeatureSource {
    fn load(&self, file_id: &str) -> TrainResult<Vec<f32>> {
        while !self.release.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.inner.load(file_id)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_run_is_rejected() {
    let release = Arc::new(AtomicBool::new(false));
    let features = Arc::new(GatedFeatureSource {
        inner: separable_features(20),
        release: Arc::clone(&release),
    });
    let harness = harness_with_features(features);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness.orchestrator.create_job(request(&dataset_id, 2)).await.unwrap();

    let orchestrator = Arc::clone(&harness.orchestrator);
    let first_job = job.clone();
    let first = tokio::spawn(async move {
        orchestrator
            .run(
                &first_job.id,
                &first_job.dataset_id,
                first_job.model_config.clone(),
                first_job.training_config.clone(),
                &first_job.created_by,
            )
            .await
    });

    // Give the first run time to claim the job and block on feature loading
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = run_job(&harness, &job).await.unwrap_err();
    assert!(matches!(err, TrainError::ConcurrentRun(_)));

    release.store(true, Ordering::SeqCst);
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_progress_merges_cache_and_survives_expiry() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness.orchestrator.create_job(request(&dataset_id, 3)).await.unwrap();
    run_job(&harness, &job).await.unwrap();

    // Warm cache: learning rate and detailed metrics come from the channel
    let progress = harness.orchestrator.progress(&job.id).await.unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.progress_percentage, 100.0);
    assert!(progress.learning_rate.is_some());
    assert!(progress.detailed_metrics.is_some());

    // Cold cache: the durable record still answers
    harness
        .cache
        .delete(&format!("training_progress:{}", job.id))
        .await;
    let progress = harness.orchestrator.progress(&job.id).await.unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.current_epoch, 2);
    assert!(progress.learning_rate.is_none());

    let err = harness.orchestrator.progress("no-such-job").await.unwrap_err();
    assert!(matches!(err, TrainError::JobNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_job_runs_in_background_to_completion() {
    let harness = harness(20);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness
        .orchestrator
        .submit_job(request(&dataset_id, 2))
        .await
        .unwrap();

    let record = harness.jobs.get(&job.id).await.unwrap();
    assert!(record.task_id.is_some());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let record = harness.jobs.get(&job.id).await.unwrap();
        if record.status.is_terminal() {
            assert_eq!(record.status, JobStatus::Completed);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job did not finish in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(harness.models.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_running_job_reaches_cancelled_state() {
    let release = Arc::new(AtomicBool::new(false));
    let features = Arc::new(GatedFeatureSource {
        inner: separable_features(20),
        release: Arc::clone(&release),
    });
    let harness = harness_with_features(features);
    let dataset_id = harness.datasets.insert(separable_dataset(20));

    let job = harness
        .orchestrator
        .submit_job(request(&dataset_id, 50))
        .await
        .unwrap();

    // Wait until the job is picked up and marked running
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let record = harness.jobs.get(&job.id).await.unwrap();
        if record.status == JobStatus::Running {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never reached running");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(harness.orchestrator.cancel(&job.id).await.unwrap());
    release.store(true, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = harness.jobs.get(&job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert!(harness.models.is_empty());
    assert!(record.model_path.is_none());
}
