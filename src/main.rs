use rustjobs::{JobHandle, JobSystem};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("RustJobs - Engine Job Scheduler\n");

    let job_system = match JobSystem::with_default_workers() {
        Ok(system) => system,
        Err(e) => {
            eprintln!("Failed to start job system: {}", e);
            std::process::exit(1);
        }
    };
    println!("Initialized job system with {} worker threads\n", job_system.num_workers());

    // Example 1: Simple job execution
    println!("Example 1: Simple job execution");
    match job_system.submit(|| println!("  Hello from a job!")) {
        Ok(job) => {
            job_system.wait_on_job(&job);
            job_system.release_job(job);
        }
        Err(e) => eprintln!("  Submit failed: {}", e),
    }
    println!("  Job completed\n");

    // Example 2: Parallel computation
    println!("Example 2: Parallel computation");
    let sum = Arc::new(AtomicUsize::new(0));
    let num_jobs = 100;
    let start = Instant::now();

    for i in 0..num_jobs {
        let sum_clone = sum.clone();
        let submitted = job_system.submit_and_release(move || {
            // Simulate some work
            let mut _local_sum = 0;
            for j in 0..1000 {
                _local_sum += j;
            }
            sum_clone.fetch_add(i, Ordering::SeqCst);
        });
        if let Err(e) = submitted {
            eprintln!("  Submit failed: {}", e);
        }
    }
    job_system.wait_on_all_jobs();

    let expected_sum: usize = (0..num_jobs).sum();
    println!("  Executed {} jobs in {:?}", num_jobs, start.elapsed());
    println!("  Sum result: {} (expected: {})\n", sum.load(Ordering::SeqCst), expected_sum);

    // Example 3: Dependencies
    println!("Example 3: Load assets, then compile shaders");
    let loaded = Arc::new(AtomicUsize::new(0));
    let loads: Vec<_> = (0..4)
        .map(|i| {
            let loaded = loaded.clone();
            JobHandle::new(move || {
                loaded.fetch_add(1, Ordering::SeqCst);
                println!("  Loaded asset {}", i);
            })
        })
        .collect();

    let loaded_clone = loaded.clone();
    let compile = JobHandle::new(move || {
        println!("  Compiling shaders after {} assets", loaded_clone.load(Ordering::SeqCst));
    });
    for load in &loads {
        if let Err(e) = compile.wait_on(load) {
            eprintln!("  Dependency failed: {}", e);
        }
    }
    for load in loads {
        if let Err(e) = job_system.submit_and_release_job(load) {
            eprintln!("  Submit failed: {}", e);
        }
    }
    if let Err(e) = job_system.submit_job(&compile) {
        eprintln!("  Submit failed: {}", e);
    }
    job_system.wait_on_job(&compile);
    println!("  Done\n");

    let stats = job_system.stats();
    println!(
        "Stats: {} submitted, {} completed, {} panicked\n",
        stats.submitted, stats.completed, stats.panicked
    );

    // Shutdown the job system
    println!("Shutting down job system...");
    match job_system.shutdown() {
        Ok(_) => println!("Done!"),
        Err(e) => eprintln!("Shutdown error: {}", e),
    }
}
