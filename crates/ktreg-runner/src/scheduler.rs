use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use ktreg_catalog::TestCase;
use tracing::{debug, error};

use crate::job::{JobResult, JobRunner};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Bounded worker pool over `items`. Every item yields exactly one result, in
/// input order; a panicking `work` call is contained and mapped by `on_panic`.
pub fn run_pool<T, R, F, P>(items: &[T], jobs: usize, work: F, on_panic: P) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
    P: Fn(&T, String) -> R + Sync,
{
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, R)>> = Mutex::new(Vec::with_capacity(items.len()));

    std::thread::scope(|scope| {
        let workers = jobs.max(1).min(items.len().max(1));
        for _ in 0..workers {
            scope.spawn(|| loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                if idx >= items.len() {
                    return;
                }
                let item = &items[idx];
                let r = match catch_unwind(AssertUnwindSafe(|| work(item))) {
                    Ok(r) => r,
                    Err(payload) => on_panic(item, panic_message(payload.as_ref())),
                };
                let mut guard = results.lock().unwrap_or_else(|e| e.into_inner());
                guard.push((idx, r));
            });
        }
    });

    let mut out = results.into_inner().unwrap_or_else(|e| e.into_inner());
    out.sort_by_key(|(idx, _)| *idx);
    out.into_iter().map(|(_, r)| r).collect()
}

/// Runs every case on the pool. Job errors and panics become failed results
/// for that case only; siblings keep running. Output is sorted by
/// (variant, id).
pub fn run_jobs(runner: &JobRunner, cases: &[TestCase], jobs: usize) -> Vec<JobResult> {
    debug!(jobs, cases = cases.len(), mode = %runner.mode(), "dispatching");
    let mut results = run_pool(
        cases,
        jobs,
        |case| {
            let started = Instant::now();
            match runner.run(case) {
                Ok(r) => r,
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(test_id = case.id, variant = %case.variant, error = %message, "job aborted");
                    JobResult::failed(case, "EJOB", message, started.elapsed().as_millis() as u64)
                }
            }
        },
        |case, message| {
            error!(test_id = case.id, variant = %case.variant, panic = %message, "job panicked");
            JobResult::failed(case, "EJOB_PANIC", format!("job panicked: {message}"), 0)
        },
    );
    results.sort_by_key(|r| (r.variant, r.id));
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_keeps_input_order_and_contains_panics() {
        let items: Vec<u32> = (0..50).collect();
        let out = run_pool(
            &items,
            8,
            |n| {
                if *n == 13 {
                    panic!("unlucky");
                }
                Ok::<u32, String>(n * 2)
            },
            |_, msg| Err(msg),
        );
        assert_eq!(out.len(), 50);
        for (i, r) in out.iter().enumerate() {
            if i == 13 {
                assert_eq!(r.as_ref().unwrap_err(), "unlucky");
            } else {
                assert_eq!(*r.as_ref().unwrap(), i as u32 * 2);
            }
        }
    }

    #[test]
    fn pool_handles_empty_and_zero_jobs() {
        let empty: Vec<u8> = Vec::new();
        assert!(run_pool(&empty, 4, |x| *x, |_, _| 0).is_empty());
        assert_eq!(run_pool(&[1u8, 2, 3], 0, |x| *x, |_, _| 0), vec![1, 2, 3]);
    }
}
