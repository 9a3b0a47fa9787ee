// Background task runner
//
// One training job executes as one unit of work. The bundled tokio runner
// spawns a task per submission, enforces a hard wall-clock limit, and
// supports best-effort cancellation through a cooperative token: the task is
// dropped at its next suspension point, so a job may not stop mid-batch
// instantly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to a submitted unit of work.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: String,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub trait TaskRunner: Send + Sync {
    /// Submit one unit of work. The caller supplies the cancellation token so
    /// it can also observe cancellation from its own side.
    fn submit(&self, task: BoxedTask, token: CancellationToken) -> TaskHandle;

    /// Best-effort cancellation; a no-op if the task already finished.
    fn cancel(&self, handle: &TaskHandle) -> bool;
}

pub struct TokioTaskRunner {
    time_limit: Duration,
    active: Arc<DashMap<String, CancellationToken>>,
}

impl TokioTaskRunner {
    pub fn new(time_limit: Duration) -> Self {
        Self { time_limit, active: Arc::new(DashMap::new()) }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Cancel a task by its handle id.
    pub fn cancel_by_id(&self, task_id: &str) -> bool {
        if let Some(entry) = self.active.get(task_id) {
            entry.value().cancel();
            true
        } else {
            false
        }
    }
}

impl TaskRunner for TokioTaskRunner {
    fn submit(&self, task: BoxedTask, token: CancellationToken) -> TaskHandle {
        let id = Uuid::new_v4().to_string();
        self.active.insert(id.clone(), token.clone());

        let time_limit = self.time_limit;
        let active = Arc::clone(&self.active);
        let task_id = id.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = task => {}
                () = task_token.cancelled() => {
                    tracing::info!(task_id = %task_id, "Task cancelled");
                }
                () = tokio::time::sleep(time_limit) => {
                    // Treated like a crash: the job record may be left
                    // running and is reconciled by an external sweep
                    tracing::error!(
                        task_id = %task_id,
                        limit_secs = time_limit.as_secs(),
                        "Task exceeded hard wall-clock limit, terminating"
                    );
                }
            }
            active.remove(&task_id);
        });

        TaskHandle { id, token }
    }

    fn cancel(&self, handle: &TaskHandle) -> bool {
        handle.token.cancel();
        self.active.contains_key(&handle.id)
    }
}
