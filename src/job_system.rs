//! High-level job system interface.
//!
//! The JobSystem is the primary entry point for scheduling and managing
//! parallel work. It owns the shared queue and the worker pool, hands out
//! job handles, and tracks how many jobs were submitted and completed so
//! callers can wait for a single job or for the whole system to go idle.

use crate::config::{JobSystemConfig, WaitStrategy};
use crate::error::JobError;
use crate::job::{JobHandle, Submission};
use crate::queue::JobQueue;
use crate::worker::WorkerPool;
use crossbeam::utils::Backoff;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default)]
struct Activity {
    submitted: u64,
    completed: u64,
}

/// State shared between the job system and its workers.
pub(crate) struct Shared {
    pub(crate) queue: JobQueue,
    activity: Mutex<Activity>,
    /// Notified whenever `completed` catches up with `submitted`.
    idle: Condvar,
    panicked: AtomicU64,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Shared {
            queue: JobQueue::new(),
            activity: Mutex::new(Activity::default()),
            idle: Condvar::new(),
            panicked: AtomicU64::new(0),
        }
    }

    /// Pushes a job that is already `Enqueued`. The handle passed in becomes
    /// the scheduler's reference.
    ///
    /// `submitted` is bumped before the push so `completed` can never get
    /// ahead of it.
    ///
    /// Used for dependents released by a finishing job; those are pushed even
    /// after shutdown is requested, as the queue is drained before exit.
    pub(crate) fn enqueue(&self, job: JobHandle) {
        self.activity.lock().submitted += 1;
        tracing::debug!(job = job.id(), "job enqueued");
        self.queue.push(job);
    }

    /// Producer-side submission. The shutdown check, the job's status change
    /// and the push all happen under the queue lock, so a job either lands on
    /// a queue the workers will still drain or is refused untouched.
    pub(crate) fn submit(&self, job: &JobHandle) -> Result<Submission, JobError> {
        let Some(queue) = self.queue.open() else {
            return Err(JobError::ShutDown);
        };

        let submission = job.begin_submit()?;
        if submission == Submission::Enqueued {
            self.activity.lock().submitted += 1;
            tracing::debug!(job = job.id(), "job enqueued");
            queue.push(job.acquire());
        }
        Ok(submission)
    }

    /// Executes and finishes a popped job, enqueues dependents it released,
    /// drops the scheduler's reference and counts the completion.
    pub(crate) fn run_job(&self, job: JobHandle) {
        let id = job.id();

        match job.execute() {
            Ok(true) => {}
            Ok(false) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::error!(job = id, %err, "job could not be executed"),
        }

        match job.finish() {
            Ok(ready) => {
                for dependent in ready {
                    self.enqueue(dependent);
                }
            }
            Err(err) => tracing::error!(job = id, %err, "job could not be finished"),
        }

        if job.release() {
            tracing::trace!(job = id, "job freed");
        }
        tracing::debug!(job = id, "job completed");

        let mut activity = self.activity.lock();
        activity.completed += 1;
        if activity.completed == activity.submitted {
            self.idle.notify_all();
        }
    }

    fn activity(&self) -> Activity {
        *self.activity.lock()
    }
}

/// Snapshot of the job system's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub workers: usize,
    pub submitted: u64,
    pub completed: u64,
    /// Jobs whose closure panicked. They still count as completed.
    pub panicked: u64,
}

/// The main job system managing worker threads and job execution.
///
/// Construction starts the workers; [`shutdown`](JobSystem::shutdown) (or
/// dropping the system) drains the queue and joins them. The system is
/// `Sync`, so any number of producer threads can submit through a shared
/// reference.
///
/// Waiting on a job from inside another job ties up a worker; if every worker
/// does so the system deadlocks.
///
/// A job may hold the last `Arc<JobSystem>`: dropping it there shuts the
/// system down from that worker, which joins every other worker and leaves
/// its own thread to exit after the job returns. Calling `shutdown` from two
/// jobs at once deadlocks, since each waits for the other's worker.
pub struct JobSystem {
    shared: Arc<Shared>,
    worker_pool: WorkerPool,
    config: JobSystemConfig,
}

impl JobSystem {
    /// Creates a new job system with the specified number of worker threads.
    ///
    /// A count of zero is raised to one.
    ///
    /// # Example
    ///
    /// ```
    /// use rustjobs::JobSystem;
    ///
    /// let job_system = JobSystem::new(4).unwrap();
    /// assert_eq!(job_system.num_workers(), 4);
    /// job_system.shutdown().unwrap();
    /// ```
    pub fn new(num_workers: usize) -> Result<Self, JobError> {
        Self::with_config(JobSystemConfig::with_workers(num_workers))
    }

    /// Creates a job system with one worker per hardware thread, minus one.
    pub fn with_default_workers() -> Result<Self, JobError> {
        Self::with_config(JobSystemConfig::default())
    }

    /// Creates a new job system with custom configuration.
    pub fn with_config(config: JobSystemConfig) -> Result<Self, JobError> {
        let shared = Arc::new(Shared::new());
        let worker_pool = WorkerPool::spawn(&config, &shared)?;

        tracing::info!(
            workers = worker_pool.size(),
            wait_strategy = ?config.wait_strategy,
            pinning = ?config.pinning,
            "job system started"
        );

        Ok(JobSystem {
            shared,
            worker_pool,
            config,
        })
    }

    /// Hands an existing job to the scheduler.
    ///
    /// A job with prerequisites is not queued here; it is queued by the last
    /// prerequisite to finish and `Submission::Deferred` is returned. Otherwise
    /// the scheduler takes its own reference, so the caller may release its
    /// handle at any time.
    ///
    /// # Errors
    ///
    /// * `JobError::ShutDown` once shutdown has begun.
    /// * `JobError::AlreadySubmitted` if the job was submitted before.
    pub fn submit_job(&self, job: &JobHandle) -> Result<Submission, JobError> {
        self.shared.submit(job)
    }

    /// Wraps `work` in a new job, submits it and returns the caller's handle.
    ///
    /// # Example
    ///
    /// ```
    /// use rustjobs::JobSystem;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let job_system = JobSystem::new(2).unwrap();
    /// let value = Arc::new(AtomicUsize::new(0));
    /// let value_clone = value.clone();
    ///
    /// let job = job_system
    ///     .submit(move || value_clone.store(7, Ordering::SeqCst))
    ///     .unwrap();
    /// job_system.wait_on_job(&job);
    /// job_system.release_job(job);
    ///
    /// assert_eq!(value.load(Ordering::SeqCst), 7);
    /// ```
    pub fn submit<F>(&self, work: F) -> Result<JobHandle, JobError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = JobHandle::new(work);
        self.submit_job(&job)?;
        Ok(job)
    }

    /// Releases the caller's reference. Returns true if the job was freed.
    pub fn release_job(&self, job: JobHandle) -> bool {
        let id = job.id();
        let freed = job.release();
        if freed {
            tracing::trace!(job = id, "job freed");
        }
        freed
    }

    /// Fire-and-forget: submits `work` and drops the caller's reference.
    pub fn submit_and_release<F>(&self, work: F) -> Result<(), JobError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = self.submit(work)?;
        self.release_job(job);
        Ok(())
    }

    /// Submits an existing job and releases the caller's reference to it,
    /// whether or not the submission succeeded.
    pub fn submit_and_release_job(&self, job: JobHandle) -> Result<Submission, JobError> {
        let submission = self.submit_job(&job);
        self.release_job(job);
        submission
    }

    /// True while some submitted job has not completed yet.
    pub fn is_busy(&self) -> bool {
        let activity = self.shared.activity();
        activity.completed < activity.submitted
    }

    /// Waits until `job` is finished. There is no timeout; a job whose
    /// prerequisites never run is waited on forever.
    pub fn wait_on_job(&self, job: &JobHandle) {
        match self.config.wait_strategy {
            WaitStrategy::Block => job.wait_done(),
            WaitStrategy::Yield => {
                let backoff = Backoff::new();
                while !job.is_finished() {
                    backoff.snooze();
                }
            }
        }
    }

    /// Waits until every submitted job, including dependents enqueued along
    /// the way, has completed.
    pub fn wait_on_all_jobs(&self) {
        match self.config.wait_strategy {
            WaitStrategy::Block => {
                let mut activity = self.shared.activity.lock();
                while activity.completed < activity.submitted {
                    self.shared.idle.wait(&mut activity);
                }
            }
            WaitStrategy::Yield => {
                let backoff = Backoff::new();
                while self.is_busy() {
                    backoff.snooze();
                }
            }
        }
    }

    /// Returns the number of worker threads in the system.
    pub fn num_workers(&self) -> usize {
        self.worker_pool.size()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.is_shutdown_requested()
    }

    pub fn config(&self) -> &JobSystemConfig {
        &self.config
    }

    pub fn stats(&self) -> JobStats {
        let activity = self.shared.activity();
        JobStats {
            workers: self.num_workers(),
            submitted: activity.submitted,
            completed: activity.completed,
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }

    /// Shuts down the job system.
    ///
    /// New submissions are refused from this point on. Workers keep running
    /// until the queue is empty and are then joined. A job that slipped into
    /// the queue after the last worker left is run on the calling thread, so
    /// every enqueued job executes. Calling this more than once is harmless,
    /// and concurrent callers all return only after the workers are joined.
    ///
    /// Called from inside a job, the worker running that job is not joined;
    /// it exits on its own once the job returns.
    ///
    /// Returns Err if any worker thread panicked.
    pub fn shutdown(&self) -> Result<(), JobError> {
        if !self.shared.queue.is_shutdown_requested() {
            tracing::info!("job system shutting down");
        }
        self.shared.queue.request_shutdown();

        let joined = self.worker_pool.join_all();

        let mut drained = 0usize;
        while let Some(job) = self.shared.queue.pop() {
            self.shared.run_job(job);
            drained += 1;
        }
        if drained > 0 {
            tracing::warn!(drained, "ran late jobs on the shutdown thread");
        }

        joined.map_err(JobError::WorkerPanicked)
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(%err, "job system shutdown failed");
        }
    }
}
