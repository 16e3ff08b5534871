//! Job definitions, the job state machine and dependency wiring.
//!
//! A job is a boxed closure plus bookkeeping: its status, the jobs waiting on
//! it, and how many prerequisites it is itself still waiting on. Jobs are
//! shared through [`JobHandle`], a reference-counted handle; the job is freed
//! when the last handle is released.

use crate::error::JobError;
use crate::sync::Event;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

type Work = Box<dyn FnOnce() + Send + 'static>;

/// Position of a job in its lifecycle.
///
/// ```text
/// Created --submit--> Enqueued --pop--> Running --finish--> Finished
/// Created --wait_on--> Waiting --last prerequisite finished--> Enqueued
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Created,
    Waiting,
    Enqueued,
    Running,
    Finished,
}

impl JobStatus {
    /// Returns true if moving from `self` to `next` is a legal step.
    ///
    /// `Waiting -> Waiting` is allowed so a job can gain further
    /// prerequisites before it runs.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Enqueued)
                | (Created, Waiting)
                | (Waiting, Waiting)
                | (Waiting, Enqueued)
                | (Enqueued, Running)
                | (Running, Finished)
        )
    }
}

/// What `submit_job` did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The job was pushed onto the queue.
    Enqueued,
    /// The job has prerequisites; it is enqueued when the last one finishes.
    Deferred,
}

struct JobState {
    status: JobStatus,
    work: Option<Work>,
    /// Jobs waiting on this one. Each entry holds a reference to its job.
    dependents: Vec<JobHandle>,
    /// Unfinished prerequisites of this job.
    pending: usize,
    /// Set once any dependency edge was recorded. Such a job is enqueued by
    /// its prerequisites, never directly by a producer.
    has_prerequisites: bool,
    panicked: bool,
}

impl JobState {
    fn transition(&mut self, to: JobStatus) -> Result<(), JobError> {
        if self.status.can_transition_to(to) {
            self.status = to;
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

pub(crate) struct Job {
    id: u64,
    state: Mutex<JobState>,
    done: Event,
}

impl Job {
    fn new(work: Work) -> Self {
        Job {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(JobState {
                status: JobStatus::Created,
                work: Some(work),
                dependents: Vec::new(),
                pending: 0,
                has_prerequisites: false,
                panicked: false,
            }),
            done: Event::new(),
        }
    }

    /// Decrements the pending count. Returns true, with the job moved to
    /// `Enqueued`, only when the last prerequisite has finished.
    fn notify_prerequisite_finished(&self) -> bool {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        state.pending == 0 && state.transition(JobStatus::Enqueued).is_ok()
    }
}

/// Locks two distinct jobs in address order.
fn lock_pair<'a>(
    first: &'a Job,
    second: &'a Job,
) -> (MutexGuard<'a, JobState>, MutexGuard<'a, JobState>) {
    if (first as *const Job) < (second as *const Job) {
        let a = first.state.lock();
        let b = second.state.lock();
        (a, b)
    } else {
        let b = second.state.lock();
        let a = first.state.lock();
        (a, b)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// A reference-counted handle to a job.
///
/// Every handle is one reference. [`acquire`](JobHandle::acquire) (or
/// `clone`) adds a reference and [`release`](JobHandle::release) (or `drop`)
/// removes one. The scheduler holds its own reference while the job is queued
/// or running, so a caller may release its handle right after submitting.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<Job>,
}

impl JobHandle {
    /// Creates a job in the `Created` state with a reference count of one.
    ///
    /// The closure is moved into the job and dropped after it runs.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        JobHandle {
            inner: Arc::new(Job::new(Box::new(work))),
        }
    }

    /// Process-unique job id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.inner.state.lock().status
    }

    pub fn is_finished(&self) -> bool {
        self.status() == JobStatus::Finished
    }

    /// True if the job's closure panicked. Only meaningful once finished.
    pub fn has_panicked(&self) -> bool {
        self.inner.state.lock().panicked
    }

    /// True while at least one prerequisite has not finished.
    pub fn is_waiting_on_others(&self) -> bool {
        self.inner.state.lock().pending > 0
    }

    /// Number of live references to this job, including the scheduler's.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Takes another reference to the job.
    pub fn acquire(&self) -> JobHandle {
        self.clone()
    }

    /// Gives up this reference. Returns true if it was the last one, in which
    /// case the job has been freed.
    pub fn release(self) -> bool {
        Arc::into_inner(self.inner).is_some()
    }

    /// Returns a non-owning handle that does not keep the job alive.
    pub fn downgrade(&self) -> WeakJobHandle {
        WeakJobHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Makes this job wait until `prerequisite` finishes.
    ///
    /// Returns `Ok(true)` when the edge was recorded and `Ok(false)` when the
    /// prerequisite had already finished, in which case nothing changes. A
    /// job may wait on any number of prerequisites; it is enqueued once, when
    /// the last of them finishes. Only `Created` or `Waiting` jobs can gain
    /// prerequisites.
    ///
    /// A dependency cycle is not detected; the jobs in it never run.
    pub fn wait_on(&self, prerequisite: &JobHandle) -> Result<bool, JobError> {
        if Arc::ptr_eq(&self.inner, &prerequisite.inner) {
            return Err(JobError::SelfDependency);
        }

        let (mut own, mut pre) = lock_pair(&self.inner, &prerequisite.inner);
        if !matches!(own.status, JobStatus::Created | JobStatus::Waiting) {
            return Err(JobError::InvalidTransition {
                from: own.status,
                to: JobStatus::Waiting,
            });
        }
        if pre.status == JobStatus::Finished {
            return Ok(false);
        }

        own.transition(JobStatus::Waiting)?;
        own.pending += 1;
        own.has_prerequisites = true;
        pre.dependents.push(self.clone());
        Ok(true)
    }

    /// Producer-side submission step: decides whether the job goes on the
    /// queue now or is left for its prerequisites to enqueue.
    pub(crate) fn begin_submit(&self) -> Result<Submission, JobError> {
        let mut state = self.inner.state.lock();
        if state.has_prerequisites {
            return Ok(Submission::Deferred);
        }
        match state.status {
            JobStatus::Created => {
                state.status = JobStatus::Enqueued;
                Ok(Submission::Enqueued)
            }
            other => Err(JobError::AlreadySubmitted(other)),
        }
    }

    /// Runs the job's closure on the calling thread.
    ///
    /// Returns `Ok(false)` if the closure panicked. The panic is caught and
    /// recorded; it never unwinds into the caller.
    pub(crate) fn execute(&self) -> Result<bool, JobError> {
        let work = {
            let mut state = self.inner.state.lock();
            state.transition(JobStatus::Running)?;
            state.work.take()
        };

        let Some(work) = work else {
            return Ok(true);
        };

        match catch_unwind(AssertUnwindSafe(work)) {
            Ok(()) => Ok(true),
            Err(payload) => {
                tracing::error!(
                    job = self.id(),
                    "job panicked: {}",
                    panic_message(&*payload)
                );
                self.inner.state.lock().panicked = true;
                Ok(false)
            }
        }
    }

    /// Marks the job finished, wakes its waiters and notifies dependents.
    ///
    /// Returns the dependents whose last prerequisite this was. They are
    /// already `Enqueued` and must be pushed onto the queue by the caller.
    pub(crate) fn finish(&self) -> Result<Vec<JobHandle>, JobError> {
        let dependents = {
            let mut state = self.inner.state.lock();
            state.transition(JobStatus::Finished)?;
            std::mem::take(&mut state.dependents)
        };
        self.inner.done.signal();

        Ok(dependents
            .into_iter()
            .filter(|dependent| dependent.inner.notify_prerequisite_finished())
            .collect())
    }

    /// Blocks until the job is finished.
    pub(crate) fn wait_done(&self) {
        self.inner.done.wait();
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// A handle that observes a job without keeping it alive.
#[derive(Clone)]
pub struct WeakJobHandle {
    inner: Weak<Job>,
}

impl WeakJobHandle {
    /// Returns a strong handle if the job has not been freed yet.
    pub fn upgrade(&self) -> Option<JobHandle> {
        self.inner.upgrade().map(|inner| JobHandle { inner })
    }

    /// True once every strong handle has been released.
    pub fn is_freed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn run(job: &JobHandle) -> Vec<JobHandle> {
        job.begin_submit().unwrap();
        job.execute().unwrap();
        job.finish().unwrap()
    }

    #[test]
    fn test_new_job_state() {
        let job = JobHandle::new(|| {});
        assert_eq!(job.status(), JobStatus::Created);
        assert_eq!(job.ref_count(), 1);
        assert!(!job.is_waiting_on_others());
        assert!(!job.has_panicked());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobHandle::new(|| {});
        let b = JobHandle::new(|| {});
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;
        assert!(Created.can_transition_to(Enqueued));
        assert!(Created.can_transition_to(Waiting));
        assert!(Waiting.can_transition_to(Enqueued));
        assert!(Enqueued.can_transition_to(Running));
        assert!(Running.can_transition_to(Finished));

        assert!(!Created.can_transition_to(Running));
        assert!(!Enqueued.can_transition_to(Waiting));
        assert!(!Running.can_transition_to(Enqueued));
        for next in [Created, Waiting, Enqueued, Running, Finished] {
            assert!(!Finished.can_transition_to(next));
        }
    }

    #[test]
    fn test_job_execution() {
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let job = JobHandle::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        assert!(run(&job).is_empty());
        assert!(executed.load(Ordering::SeqCst));
        assert_eq!(job.status(), JobStatus::Finished);
    }

    #[test]
    fn test_job_cannot_execute_twice() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let job = JobHandle::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        run(&job);
        assert!(matches!(
            job.execute(),
            Err(JobError::InvalidTransition {
                from: JobStatus::Finished,
                to: JobStatus::Running
            })
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_job_is_recorded() {
        let job = JobHandle::new(|| panic!("boom"));
        job.begin_submit().unwrap();
        assert!(!job.execute().unwrap());
        job.finish().unwrap();
        assert!(job.has_panicked());
        assert!(job.is_finished());
    }

    #[test]
    fn test_resubmit_is_rejected() {
        let job = JobHandle::new(|| {});
        assert_eq!(job.begin_submit().unwrap(), Submission::Enqueued);
        assert!(matches!(
            job.begin_submit(),
            Err(JobError::AlreadySubmitted(JobStatus::Enqueued))
        ));
    }

    #[test]
    fn test_acquire_release_frees_once() {
        let job = JobHandle::new(|| {});
        let weak = job.downgrade();

        let extra = job.acquire();
        assert_eq!(job.ref_count(), 2);

        assert!(!extra.release());
        assert!(!weak.is_freed());
        assert_eq!(job.ref_count(), 1);

        assert!(job.release());
        assert!(weak.is_freed());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_closure_dropped_after_execution() {
        struct Sentinel(Arc<AtomicUsize>);
        impl Drop for Sentinel {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let sentinel = Sentinel(drops.clone());
        let job = JobHandle::new(move || {
            let _keep = &sentinel;
        });

        run(&job);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(job);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_on_self_is_rejected() {
        let job = JobHandle::new(|| {});
        assert!(matches!(job.wait_on(&job), Err(JobError::SelfDependency)));
    }

    #[test]
    fn test_wait_on_finished_prerequisite_is_noop() {
        let pre = JobHandle::new(|| {});
        run(&pre);

        let dependent = JobHandle::new(|| {});
        assert!(!dependent.wait_on(&pre).unwrap());
        assert_eq!(dependent.status(), JobStatus::Created);
        assert_eq!(dependent.begin_submit().unwrap(), Submission::Enqueued);
    }

    #[test]
    fn test_wait_on_after_submit_is_rejected() {
        let pre = JobHandle::new(|| {});
        let job = JobHandle::new(|| {});
        job.begin_submit().unwrap();
        assert!(matches!(
            job.wait_on(&pre),
            Err(JobError::InvalidTransition {
                from: JobStatus::Enqueued,
                to: JobStatus::Waiting
            })
        ));
    }

    #[test]
    fn test_dependent_released_by_prerequisite() {
        let pre = JobHandle::new(|| {});
        let dependent = JobHandle::new(|| {});

        assert!(dependent.wait_on(&pre).unwrap());
        assert_eq!(dependent.status(), JobStatus::Waiting);
        assert!(dependent.is_waiting_on_others());
        // The prerequisite holds a reference to its dependent.
        assert_eq!(dependent.ref_count(), 2);
        assert_eq!(dependent.begin_submit().unwrap(), Submission::Deferred);

        let ready = run(&pre);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id(), dependent.id());
        assert_eq!(dependent.status(), JobStatus::Enqueued);
        assert!(!dependent.is_waiting_on_others());
    }

    #[test]
    fn test_dependent_waits_for_every_prerequisite() {
        let first = JobHandle::new(|| {});
        let second = JobHandle::new(|| {});
        let dependent = JobHandle::new(|| {});

        assert!(dependent.wait_on(&first).unwrap());
        assert!(dependent.wait_on(&second).unwrap());

        assert!(run(&first).is_empty());
        assert_eq!(dependent.status(), JobStatus::Waiting);

        let ready = run(&second);
        assert_eq!(ready.len(), 1);
        assert_eq!(dependent.status(), JobStatus::Enqueued);
    }

    #[test]
    fn test_prerequisite_accepts_many_dependents() {
        let pre = JobHandle::new(|| {});
        let dependents: Vec<_> = (0..3).map(|_| JobHandle::new(|| {})).collect();
        for dependent in &dependents {
            assert!(dependent.wait_on(&pre).unwrap());
        }

        let ready = run(&pre);
        assert_eq!(ready.len(), 3);
        for dependent in &dependents {
            assert_eq!(dependent.status(), JobStatus::Enqueued);
        }
    }
}
