//! Error types returned by the job system.

use crate::job::JobStatus;
use thiserror::Error;

/// Errors reported by job submission, dependency wiring and lifecycle calls.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job system has been shut down and accepts no new work.
    #[error("job system is shut down")]
    ShutDown,

    /// A job was asked to wait on itself.
    #[error("a job cannot wait on itself")]
    SelfDependency,

    /// The requested status change is not part of the job state machine.
    #[error("illegal job status transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// The job was already handed to the scheduler.
    #[error("job already submitted (status {0:?})")]
    AlreadySubmitted(JobStatus),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// One or more worker threads panicked outside of job execution.
    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),
}
