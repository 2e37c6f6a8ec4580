// src/mc/progress.rs
use tracing::info;

/// Receives progress of long-running pricing work
///
/// `completed` counts finished units (sweep points, partitions) out of
/// `total`. Implementations must be cheap; they are called from worker
/// threads.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, stage: &str, completed: usize, total: usize);
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _stage: &str, _completed: usize, _total: usize) {}
}

/// Logs progress as a percentage through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_progress(&self, stage: &str, completed: usize, total: usize) {
        let percent = if total == 0 { 100 } else { completed * 100 / total };
        info!(stage, completed, total, "{}% of simulation", percent);
    }
}
