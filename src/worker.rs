//! Worker thread implementation.
//!
//! Each worker blocks on the shared queue, runs whatever it pops, finishes
//! the job (enqueuing any dependents that became ready) and counts the
//! completion. Workers exit once shutdown is requested and the queue is empty.

use crate::PinningStrategy;
use crate::config::JobSystemConfig;
use crate::error::JobError;
use crate::job_system::Shared;
use core_affinity::CoreId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A worker thread that executes jobs from the shared queue.
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a named worker thread, optionally pinned to `core`.
    pub(crate) fn spawn(
        id: usize,
        name: String,
        core: Option<CoreId>,
        shared: Arc<Shared>,
    ) -> Result<Self, JobError> {
        let handle = thread::Builder::new().name(name).spawn(move || {
            if let Some(core) = core {
                if !core_affinity::set_for_current(core) {
                    tracing::warn!(worker = id, core = core.id, "failed to pin worker");
                }
            }

            Worker::run_loop(id, &shared);
        })?;

        Ok(Worker {
            id,
            handle: Some(handle),
        })
    }

    /// Pop, execute, finish, release, count. Repeats until the queue reports
    /// shutdown.
    fn run_loop(id: usize, shared: &Shared) {
        let span = tracing::info_span!("worker", id);
        let _enter = span.enter();
        tracing::debug!("worker started");

        while let Some(job) = shared.queue.wait_pop() {
            shared.run_job(job);
        }

        tracing::debug!("worker exiting");
    }

    /// Returns the worker's ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// True when called from this worker's own thread.
    fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Waits for the worker thread to finish.
    pub fn join(mut self) -> thread::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

/// Picks the core a worker is pinned to, if any.
fn core_for_worker(strategy: PinningStrategy, id: usize, core_ids: &[CoreId]) -> Option<CoreId> {
    match strategy {
        PinningStrategy::None => None,
        PinningStrategy::Linear => core_ids.get(id).copied(),
        PinningStrategy::AvoidSMT => core_ids.get(id * 2).copied(),
    }
}

/// The fixed set of worker threads owned by a job system.
pub struct WorkerPool {
    workers: Mutex<Vec<Worker>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `config.resolved_workers()` workers draining `shared.queue`.
    ///
    /// If any spawn fails, the workers already started are shut down and
    /// joined before the error is returned.
    pub(crate) fn spawn(config: &JobSystemConfig, shared: &Arc<Shared>) -> Result<Self, JobError> {
        let size = config.resolved_workers();
        let core_ids = match config.pinning {
            PinningStrategy::None => Vec::new(),
            _ => core_affinity::get_core_ids().unwrap_or_default(),
        };

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let name = format!("{}-{}", config.thread_name_prefix, id);
            let core = core_for_worker(config.pinning, id, &core_ids);

            match Worker::spawn(id, name, core, Arc::clone(shared)) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    shared.queue.request_shutdown();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(err);
                }
            }
        }

        Ok(WorkerPool {
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Returns the number of worker threads the pool was started with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Joins every worker still running. The queue must already be flagged
    /// for shutdown.
    ///
    /// The pool lock is held until every join returns, so a second caller
    /// blocks until the first is done. A worker calling this is detached
    /// rather than joined.
    ///
    /// Returns Err with the number of workers that panicked.
    pub(crate) fn join_all(&self) -> Result<(), usize> {
        let mut workers = self.workers.lock();

        let mut failed_count = 0;
        for worker in workers.drain(..) {
            let worker_id = worker.id();
            if worker.is_current() {
                tracing::debug!(worker = worker_id, "shutdown called from this worker, detaching");
                continue;
            }
            if worker.join().is_err() {
                failed_count += 1;
                tracing::error!(worker = worker_id, "worker thread panicked");
            }
        }

        if failed_count > 0 {
            Err(failed_count)
        } else {
            Ok(())
        }
    }
}
