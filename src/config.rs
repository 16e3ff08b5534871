//! Configuration for the job system.
//!
//! `JobSystemConfig` is plain data with serde support so applications can
//! embed it in their own configuration files. Every field has a default, so a
//! partial document deserializes cleanly.

use crate::PinningStrategy;
use serde::{Deserialize, Serialize};
use std::thread;

/// How callers block in `wait_on_job` and `wait_on_all_jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitStrategy {
    /// Park the calling thread until the job (or the whole system) completes.
    #[default]
    Block,
    /// Spin with exponential backoff, yielding to the OS between checks.
    ///
    /// Burns CPU on the waiting thread in exchange for the lowest wake latency.
    Yield,
}

/// Configuration for a [`JobSystem`](crate::JobSystem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSystemConfig {
    /// Number of worker threads. `None` picks hardware threads minus one.
    pub num_workers: Option<usize>,
    /// Waiting policy for callers blocked on job completion.
    pub wait_strategy: WaitStrategy,
    /// Core pinning for worker threads.
    pub pinning: PinningStrategy,
    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
}

impl Default for JobSystemConfig {
    fn default() -> Self {
        Self {
            num_workers: None,
            wait_strategy: WaitStrategy::Block,
            pinning: PinningStrategy::None,
            thread_name_prefix: "job-worker".to_string(),
        }
    }
}

impl JobSystemConfig {
    /// Creates a configuration with an explicit worker count.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers: Some(num_workers),
            ..Self::default()
        }
    }

    /// Resolves the number of worker threads to spawn. Always at least one.
    pub fn resolved_workers(&self) -> usize {
        match self.num_workers {
            Some(n) => n.max(1),
            None => default_worker_count(),
        }
    }
}

/// Hardware threads minus one, leaving a core for the thread that drives the
/// system. Never returns zero.
pub fn default_worker_count() -> usize {
    let hardware_threads = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    hardware_threads.saturating_sub(1).max(1)
}
