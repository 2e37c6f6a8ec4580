// src/mc/distributed.rs
//! Partitioned execution
//!
//! The path range `0..N` is cut into contiguous partitions. Each partition is
//! handed to a [`PartitionWorker`], which reports a [`PathTally`] for exactly
//! its paths. Partitions that fail, panic or report the wrong number of paths
//! are resubmitted up to `max_retries` times; the call fails with
//! [`AutocallError::WorkerFailure`] once a partition runs out of attempts.
//!
//! Tallies are merged in partition order, and only after every partition has
//! reported, so the result does not depend on which attempt succeeded.

use crate::error::{AutocallError, AutocallResult};
use crate::mc::mc_engine::{ExecutionStrategy, PathTally, PricingJob};
use crate::mc::progress::{NoProgress, ProgressObserver};
use rayon::prelude::*;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A contiguous slice of the global path range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Split `0..paths` into at most `partitions` contiguous, non-empty ranges
///
/// The first `paths % partitions` ranges hold one extra path.
pub fn partition_paths(paths: usize, partitions: usize) -> Vec<Partition> {
    let count = partitions.max(1).min(paths);
    if count == 0 {
        return Vec::new();
    }
    let base = paths / count;
    let extra = paths % count;
    let mut start = 0;
    (0..count)
        .map(|index| {
            let len = base + usize::from(index < extra);
            let partition = Partition {
                index,
                start,
                end: start + len,
            };
            start += len;
            partition
        })
        .collect()
}

/// Why a worker did not deliver a partition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("worker lost: {0}")]
    Lost(String),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("tally covers {reported} paths, partition holds {expected}")]
    Incomplete { expected: usize, reported: usize },
}

/// Something that can evaluate one partition of a pricing job
///
/// Implementations may run the partition anywhere, but must evaluate exactly
/// the global path indices of `partition` against `job` so every topology
/// sees the same draws.
pub trait PartitionWorker: Send + Sync {
    fn evaluate(&self, job: &PricingJob<'_>, partition: &Partition) -> Result<PathTally, WorkerError>;
}

/// Evaluates partitions on the local rayon pool
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWorker;

impl PartitionWorker for LocalWorker {
    fn evaluate(&self, job: &PricingJob<'_>, partition: &Partition) -> Result<PathTally, WorkerError> {
        Ok(job.simulate_range(partition.range()))
    }
}

/// Partitioned strategy with bounded retries
pub struct Distributed {
    worker: Arc<dyn PartitionWorker>,
    partitions: usize,
    max_retries: usize,
    observer: Arc<dyn ProgressObserver>,
}

impl Distributed {
    pub fn new(worker: Arc<dyn PartitionWorker>, partitions: usize, max_retries: usize) -> Self {
        Self {
            worker,
            partitions,
            max_retries,
            observer: Arc::new(NoProgress),
        }
    }

    pub fn local(partitions: usize, max_retries: usize) -> Self {
        Self::new(Arc::new(LocalWorker), partitions, max_retries)
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn attempt(&self, job: &PricingJob<'_>, partition: &Partition) -> Result<PathTally, WorkerError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.worker.evaluate(job, partition)));
        let tally = match outcome {
            Ok(result) => result?,
            Err(payload) => return Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
        };
        if tally.paths() != partition.len() {
            return Err(WorkerError::Incomplete {
                expected: partition.len(),
                reported: tally.paths(),
            });
        }
        Ok(tally)
    }
}

impl ExecutionStrategy for Distributed {
    fn name(&self) -> &'static str {
        "distributed"
    }

    fn run(&self, job: &PricingJob<'_>) -> AutocallResult<PathTally> {
        if self.partitions == 0 {
            return Err(AutocallError::InvalidConfiguration {
                field: "partitions".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let partitions = partition_paths(job.paths, self.partitions);
        let total = partitions.len();
        let mut tallies: Vec<Option<PathTally>> = vec![None; total];
        let mut pending: Vec<Partition> = partitions;
        let completed = AtomicUsize::new(0);

        for attempt in 0..=self.max_retries {
            let results: Vec<(Partition, Result<PathTally, WorkerError>)> = pending
                .par_iter()
                .map(|partition| {
                    let result = self.attempt(job, partition);
                    if result.is_ok() {
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        self.observer.on_progress("partitions", done, total);
                    }
                    (*partition, result)
                })
                .collect();

            let mut failed = Vec::new();
            for (partition, result) in results {
                match result {
                    Ok(tally) => tallies[partition.index] = Some(tally),
                    Err(error) => {
                        if attempt == self.max_retries {
                            return Err(AutocallError::WorkerFailure {
                                partition: partition.index,
                                attempts: attempt + 1,
                                reason: error.to_string(),
                            });
                        }
                        warn!(
                            partition = partition.index,
                            attempt = attempt + 1,
                            error = %error,
                            "partition failed, resubmitting"
                        );
                        failed.push(partition);
                    }
                }
            }

            if failed.is_empty() {
                break;
            }
            pending = failed;
        }

        debug!(partitions = total, paths = job.paths, "all partitions reported");
        Ok(tallies
            .into_iter()
            .flatten()
            .fold(PathTally::default(), PathTally::merge))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_cover_range() {
        let parts = partition_paths(10, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].range(), 0..4);
        assert_eq!(parts[1].range(), 4..7);
        assert_eq!(parts[2].range(), 7..10);
        assert_eq!(parts.iter().map(Partition::len).sum::<usize>(), 10);
    }

    #[test]
    fn test_more_partitions_than_paths() {
        let parts = partition_paths(2, 8);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len() == 1));
        assert!(partition_paths(0, 4).is_empty());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
