//! Shared FIFO of ready-to-run jobs.
//!
//! One mutex guards both the jobs and the shutdown flag, and idle workers
//! sleep on a condition variable tied to that mutex. A worker re-checks
//! "queue non-empty or shutdown requested" under the lock before sleeping, so
//! a push can never slip between the check and the wait.

use crate::job::JobHandle;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;

struct QueueState {
    jobs: VecDeque<JobHandle>,
    shutdown: bool,
}

/// Unbounded, lock-protected FIFO of job handles.
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        JobQueue {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends a job and wakes one idle worker.
    pub fn push(&self, job: JobHandle) {
        self.state.lock().jobs.push_back(job);
        self.available.notify_one();
    }

    /// Pushes a job unless shutdown was requested, in which case the job is
    /// handed back.
    pub fn try_push(&self, job: JobHandle) -> Result<(), JobHandle> {
        match self.open() {
            Some(open) => {
                open.push(job);
                Ok(())
            }
            None => Err(job),
        }
    }

    /// Locks the queue if it still accepts jobs.
    ///
    /// Shutdown cannot be requested while the returned guard is alive, so
    /// anything decided under it is decided against an open queue.
    pub fn open(&self) -> Option<OpenQueue<'_>> {
        let state = self.state.lock();
        if state.shutdown {
            return None;
        }
        Some(OpenQueue {
            state,
            available: &self.available,
        })
    }

    /// Removes and returns the front job without blocking.
    pub fn pop(&self) -> Option<JobHandle> {
        self.state.lock().jobs.pop_front()
    }

    /// Returns another reference to the front job, leaving it queued.
    pub fn front(&self) -> Option<JobHandle> {
        self.state.lock().jobs.front().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Blocks until a job is available or shutdown is requested.
    ///
    /// Queued jobs are still handed out after shutdown is requested; `None`
    /// is returned only once the queue has drained.
    pub fn wait_pop(&self) -> Option<JobHandle> {
        let mut state = self.state.lock();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.shutdown {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Flags shutdown and wakes every waiting worker.
    pub fn request_shutdown(&self) {
        self.state.lock().shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.state.lock().shutdown
    }
}

/// Lock on a queue that has not been shut down. See [`JobQueue::open`].
pub struct OpenQueue<'a> {
    state: MutexGuard<'a, QueueState>,
    available: &'a Condvar,
}

impl OpenQueue<'_> {
    /// Appends a job, unlocks the queue and wakes one idle worker.
    pub fn push(mut self, job: JobHandle) {
        self.state.jobs.push_back(job);
        drop(self.state);
        self.available.notify_one();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        JobQueue::new()
    }
}
