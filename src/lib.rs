// Cadet - Training orchestration core for CAD drawing AI models
// Library exports

// Core modules
pub mod config;
pub mod dataset;
pub mod errors;
pub mod jobs; // Job lifecycle, orchestrator and background runner
pub mod models; // Trainable model interface and bundled reference net
pub mod progress; // Low-latency progress channel and cache
pub mod storage;
pub mod training; // Epoch trainer, checkpoints, optimization
