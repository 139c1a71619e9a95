//! Generic bounded-parallelism task runner shared by the capture and
//! compare phases.

use crate::RunnerError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs per-item workers with at most `limit` simultaneously in flight.
///
/// A freed slot immediately admits the next queued item. Workers return
/// plain result records; a single item's failure is represented inside its
/// record and never aborts the batch. The output is indexed 1:1 to the
/// input list regardless of completion order.
///
/// The pool itself is stateless; capture and compare each construct their
/// own with their configured ceiling.
pub struct ConcurrencyPool {
    limit: usize,
}

impl ConcurrencyPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> Result<Vec<R>, RunnerError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let worker = Arc::new(worker);

        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let semaphore = Arc::clone(&semaphore);
                let worker = Arc::clone(&worker);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await?;
                    Ok::<R, RunnerError>(worker(item).await)
                })
            })
            .collect();

        // Awaiting in spawn order keeps results aligned with the input.
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| RunnerError::Scheduler(e.to_string()))??;
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_results_are_input_ordered() {
        let pool = ConcurrencyPool::new(3);
        // Later items finish first; output order must still match input.
        let results = pool
            .run(vec![30u64, 20, 10], |delay| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay
            })
            .await
            .unwrap();

        assert_eq!(results, vec![30, 20, 10]);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        let pool = ConcurrencyPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..10).collect();
        let active_ref = Arc::clone(&active);
        let peak_ref = Arc::clone(&peak);

        pool.run(items, move |_| {
            let active = Arc::clone(&active_ref);
            let peak = Arc::clone(&peak_ref);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort_batch() {
        let pool = ConcurrencyPool::new(2);
        let results = pool
            .run(vec![1u32, 2, 3, 4], |n| async move {
                if n % 2 == 0 {
                    Err(format!("item {n} failed"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0], Ok(1));
        assert!(results[1].is_err());
        assert_eq!(results[2], Ok(3));
        assert!(results[3].is_err());
    }

    #[tokio::test]
    async fn test_wall_clock_shows_bounded_parallelism() {
        // With 2 slots and durations [50,10,10,10,10]ms the second slot
        // drains the four short items while the first runs the long one, so
        // the batch finishes with the 50ms item rather than the 90ms serial
        // sum.
        let pool = ConcurrencyPool::new(2);
        let started = Instant::now();

        pool.run(vec![50u64, 10, 10, 10, 10], |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        })
        .await
        .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(85), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_zero_limit_clamps_to_one() {
        let pool = ConcurrencyPool::new(0);
        assert_eq!(pool.limit(), 1);

        let results = pool.run(vec![1, 2], |n| async move { n * 2 }).await.unwrap();
        assert_eq!(results, vec![2, 4]);
    }
}
