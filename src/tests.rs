//! Integration tests for the job system.

use crate::{JobHandle, JobStatus, JobSystem, Submission};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

#[test]
fn test_basic_job_execution() {
    let job_system = JobSystem::new(2).unwrap();
    let value = Arc::new(AtomicUsize::new(0));
    let value_clone = value.clone();

    let job = job_system
        .submit(move || {
            value_clone.store(42, Ordering::SeqCst);
        })
        .unwrap();

    job_system.wait_on_job(&job);
    assert_eq!(value.load(Ordering::SeqCst), 42);
    job_system.shutdown().expect("Shutdown failed");
}

#[test]
fn test_thousand_noop_jobs() {
    let job_system = JobSystem::new(4).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let counter_clone = counter.clone();
        job_system
            .submit_and_release(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    job_system.wait_on_all_jobs();
    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert!(!job_system.is_busy());

    let stats = job_system.stats();
    assert_eq!(stats.submitted, 1000);
    assert_eq!(stats.completed, 1000);
    job_system.shutdown().expect("Shutdown failed");
}

#[test]
fn test_single_producer_fifo_order() {
    // One worker makes execution order equal to queue order.
    let job_system = JobSystem::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let order = order.clone();
        job_system
            .submit_and_release(move || order.lock().unwrap().push(i))
            .unwrap();
    }

    job_system.wait_on_all_jobs();
    assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
    job_system.shutdown().expect("Shutdown failed");
}

#[test]
fn test_observed_statuses_are_monotonic() {
    let job_system = JobSystem::new(2).unwrap();
    let (tx, rx) = std::sync::mpsc::channel::<()>();

    let job = JobHandle::new(move || {
        rx.recv().unwrap();
    });
    let mut observed = vec![job.status()];

    job_system.submit_job(&job).unwrap();
    observed.push(job.status());

    // Let the worker pick it up before releasing it.
    while job.status() != JobStatus::Running {
        thread::sleep(Duration::from_millis(1));
    }
    observed.push(job.status());
    tx.send(()).unwrap();

    job_system.wait_on_job(&job);
    observed.push(job.status());

    assert_monotonic(&observed);
    assert_eq!(observed.last(), Some(&JobStatus::Finished));
    job_system.shutdown().expect("Shutdown failed");
}

#[test]
fn test_dependent_statuses_are_monotonic() {
    let job_system = JobSystem::new(2).unwrap();
    let (release_prerequisite, prerequisite_gate) = mpsc::channel::<()>();
    let (release_dependent, dependent_gate) = mpsc::channel::<()>();

    let prerequisite = JobHandle::new(move || prerequisite_gate.recv().unwrap());
    let dependent = JobHandle::new(move || dependent_gate.recv().unwrap());
    let mut observed = vec![dependent.status()];

    dependent.wait_on(&prerequisite).unwrap();
    observed.push(dependent.status());
    assert_eq!(
        job_system.submit_job(&dependent).unwrap(),
        Submission::Deferred
    );
    job_system.submit_job(&prerequisite).unwrap();

    // Held back until the prerequisite finishes.
    observed.push(dependent.status());
    assert_eq!(dependent.status(), JobStatus::Waiting);

    release_prerequisite.send(()).unwrap();
    loop {
        let status = dependent.status();
        observed.push(status);
        if status == JobStatus::Running {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    release_dependent.send(()).unwrap();

    job_system.wait_on_job(&dependent);
    observed.push(dependent.status());

    assert_monotonic(&observed);
    assert_eq!(observed[0], JobStatus::Created);
    assert_eq!(observed[1], JobStatus::Waiting);
    assert_eq!(observed.last(), Some(&JobStatus::Finished));
    job_system.shutdown().expect("Shutdown failed");
}

// Polling can skip states, so check order rather than single steps.
fn assert_monotonic(observed: &[JobStatus]) {
    let rank = |status: JobStatus| match status {
        JobStatus::Created => 0,
        JobStatus::Waiting => 1,
        JobStatus::Enqueued => 2,
        JobStatus::Running => 3,
        JobStatus::Finished => 4,
    };
    for pair in observed.windows(2) {
        assert!(
            rank(pair[0]) <= rank(pair[1]),
            "status went backwards: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_jobs_submitting_jobs() {
    let job_system = Arc::new(JobSystem::new(4).unwrap());
    let result = Arc::new(AtomicUsize::new(0));

    let system = job_system.clone();
    let result_clone = result.clone();
    job_system
        .submit_and_release(move || {
            for _ in 0..5 {
                let result = result_clone.clone();
                system
                    .submit_and_release(move || {
                        result.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        })
        .unwrap();

    job_system.wait_on_all_jobs();
    assert_eq!(result.load(Ordering::SeqCst), 5);
    job_system.shutdown().expect("Shutdown failed");
}

#[test]
fn test_deferred_job_not_counted_until_ready() {
    let job_system = JobSystem::new(2).unwrap();
    let prerequisite = JobHandle::new(|| {});
    let dependent = JobHandle::new(|| {});
    dependent.wait_on(&prerequisite).unwrap();

    assert_eq!(
        job_system.submit_job(&dependent).unwrap(),
        Submission::Deferred
    );
    assert_eq!(job_system.stats().submitted, 0);
    assert!(!job_system.is_busy());

    job_system.submit_job(&prerequisite).unwrap();
    job_system.wait_on_all_jobs();

    assert!(dependent.is_finished());
    assert_eq!(job_system.stats().submitted, 2);
    assert_eq!(job_system.stats().completed, 2);
    job_system.shutdown().expect("Shutdown failed");
}
