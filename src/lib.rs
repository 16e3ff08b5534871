//! # RustJobs - Engine Job Scheduler
//!
//! A job system for engine workloads such as shader compiles and asset
//! loads. A fixed pool of worker threads drains a single shared FIFO queue of
//! jobs submitted from any number of producer threads.
//!
//! ## Architecture
//!
//! - **Jobs**: boxed closures with a status state machine, shared through
//!   reference-counted [`JobHandle`]s
//! - **Dependencies**: a job can wait on any number of prerequisites and is
//!   queued once, when the last of them finishes
//! - **Job Queue**: lock-protected FIFO; idle workers sleep on a condition
//!   variable instead of polling
//! - **Worker Threads**: OS threads running a pop-execute-finish loop until
//!   shutdown drains the queue
//!
//! The library logs through `tracing` and never installs a subscriber itself.
//!
//! ## Example
//!
//! ```
//! use rustjobs::{JobHandle, JobSystem};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! let job_system = JobSystem::new(4).unwrap();
//! let loaded = Arc::new(AtomicBool::new(false));
//!
//! let loaded_clone = loaded.clone();
//! let load = JobHandle::new(move || loaded_clone.store(true, Ordering::SeqCst));
//! let loaded_clone = loaded.clone();
//! let compile = JobHandle::new(move || assert!(loaded_clone.load(Ordering::SeqCst)));
//!
//! compile.wait_on(&load).unwrap();
//! job_system.submit_job(&load).unwrap();
//! job_system.submit_job(&compile).unwrap();
//!
//! job_system.wait_on_all_jobs();
//! assert!(compile.is_finished() && !compile.has_panicked());
//! job_system.shutdown().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod job_system;
pub mod queue;
pub mod sync;
pub mod worker;

use serde::{Deserialize, Serialize};

/// Strategy for pinning worker threads to CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinningStrategy {
    /// No pinning (standard OS scheduling).
    #[default]
    None,
    /// Linear pinning (worker i -> logical processor i).
    Linear,
    /// Pin to physical cores only (even-numbered logical processors), avoiding SMT contention.
    AvoidSMT,
}

pub use config::{JobSystemConfig, WaitStrategy};
pub use error::JobError;
pub use job::{JobHandle, JobStatus, Submission, WeakJobHandle};
pub use job_system::{JobStats, JobSystem};
pub use sync::Event;

#[cfg(test)]
mod tests;
