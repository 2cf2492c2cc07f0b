//! Bounded parallel fan-out: run a batch of futures with at most `workers`
//! running concurrently, and block until all of them finish.
//!
//! This is the "bounded worker pool" the design calls for around bid
//! collection and commit. Each call to [`WorkerPool::run`] is itself a
//! completion barrier — callers must not observe any result before every
//! job submitted to that call has finished, or determinism is lost. A
//! future is inert until polled, so handing over already-built futures
//! (rather than closures that build them) costs nothing and keeps the API
//! simple.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// `workers` is clamped to at least 1; a pool of zero workers could
    /// never make progress.
    pub fn new(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run every job in `jobs` with bounded concurrency, returning their
    /// results once all have completed. Result order is NOT guaranteed to
    /// match submission order — callers that need to correlate a result
    /// with its job must carry an identifying key inside `T`.
    pub async fn run<Fut, T>(&self, jobs: Vec<Fut>) -> Vec<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set = JoinSet::new();

        for job in jobs {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("worker pool semaphore should never be closed");

            set.spawn(async move {
                let _permit = permit;
                job.await
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(outcome) = set.join_next().await {
            results.push(outcome.expect("worker task panicked"));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_job_and_collects_every_result() {
        let pool = WorkerPool::new(2);
        let jobs: Vec<_> = (0..10u32).map(|i| async move { i * 2 }).collect();

        let mut results = pool.run(jobs).await;
        results.sort_unstable();

        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_the_configured_concurrency() {
        let pool = WorkerPool::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..20)
            .map(|_| {
                let in_flight = in_flight.clone();
                let max_observed = max_observed.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        pool.run(jobs).await;
        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }
}
