// Progress propagation: notification payloads, the short-TTL cache and the
// write-through channel

mod cache;
mod channel;
mod update;

pub use cache::{InMemoryProgressCache, ProgressCache};
pub use channel::ProgressChannel;
pub use update::{BatchProgress, ProgressUpdate};

use async_trait::async_trait;

/// Receiver for training progress notifications.
///
/// Emission is fire-and-forget from the trainer's point of view: a sink must
/// never fail the training loop.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, update: ProgressUpdate);
}

/// Sink that drops every notification; used when training standalone.
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn on_progress(&self, _update: ProgressUpdate) {}
}
