//! Fixed-size worker pool fed by the poll thread.
//!
//! Jobs queue without bound on a `crossbeam_channel`; at most `size` run at
//! once. A panicking job is logged and its worker keeps serving.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::error;

use crate::dispatch::panic_message;

use super::{SERVER_TARGET, ServerError};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers; zero still starts one.
    pub(crate) fn new(size: usize) -> Result<Self, ServerError> {
        let (jobs, queue) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..size.max(1))
            .map(|index| {
                let queue = queue.clone();
                let name = format!("tinyrpc-worker-{index}");
                thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || run_worker(&queue))
                    .map_err(|source| ServerError::Spawn { name, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// Queues `job`. Returns `false` once the pool has shut down.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(Box::new(job)).is_ok())
    }

    /// Lets queued jobs finish, then waits for every worker to exit.
    pub(crate) fn join(mut self) -> Result<(), ServerError> {
        self.jobs = None;
        let mut outcome = Ok(());
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("tinyrpc-worker").to_owned();
            if worker.join().is_err() {
                outcome = Err(ServerError::ThreadPanic { name });
            }
        }
        outcome
    }
}

/// Runs jobs until the sending side is dropped and the queue is empty.
fn run_worker(queue: &Receiver<Job>) {
    for job in queue {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(
                target: SERVER_TARGET,
                panic = %panic_message(payload.as_ref()),
                "worker job panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn runs_every_queued_job() {
        let pool = WorkerPool::new(2).expect("pool");
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            assert!(pool.submit(move || {
                thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.join().expect("join");
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[rstest]
    fn panicking_jobs_do_not_kill_workers() {
        let pool = WorkerPool::new(1).expect("pool");
        let done = Arc::new(AtomicUsize::new(0));
        assert!(pool.submit(|| panic!("driver fault")));
        let counter = Arc::clone(&done);
        assert!(pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        pool.join().expect("join");
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(3, 3)]
    fn concurrency_matches_the_worker_count(#[case] size: usize, #[case] expected: usize) {
        let pool = WorkerPool::new(size).expect("pool");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..expected * 4 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            assert!(pool.submit(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        pool.join().expect("join");
        assert!(peak.load(Ordering::SeqCst) <= expected);
    }
}
