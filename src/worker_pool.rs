//! Bounded worker pool for running handler closures off the connection task.
//!
//! Generalizes `protocol::rpc::command_queue::CommandQueue`'s single
//! background worker into a pool of `max_workers` concurrent slots, gated by
//! a [`tokio::sync::Semaphore`] rather than a single FIFO channel, since
//! handler work here does not need the strict single-worker ordering
//! `CommandQueue` provides for RPC replies.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A pool of bounded concurrency for offloading handler work.
///
/// With `max_workers == 0` the pool has no capacity limit; `submit_wait`
/// degrades to running the task inline on the caller, matching the "run on
/// the connection task" fallback the teacher's single-worker queue takes
/// when nothing else is available.
pub struct WorkerPool {
    semaphore: Option<Arc<Semaphore>>,
    max_workers: Mutex<usize>,
    in_flight: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

/// Held for the lifetime of a dispatched handler. Dropping it frees the
/// slot; unlike [`WorkerPool::submit`]/[`WorkerPool::submit_wait`] this
/// doesn't spawn its own task, so the caller can run the handler on its own
/// task and still keep the global concurrency bound — the shape
/// `wire::process_rpc_command` needs, since it borrows its output buffer
/// and cannot hand the work to a `'static` task.
pub struct WorkerSlot {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
    counted: bool,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        if self.counted {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: if max_workers == 0 { None } else { Some(Arc::new(Semaphore::new(max_workers))) },
            max_workers: Mutex::new(max_workers),
            in_flight: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits up to `timeout` for a free worker slot, returning a guard the
    /// caller holds for the duration of the work; falls back to an
    /// uncounted, always-available slot (inline execution) on timeout or
    /// when the pool is disabled.
    pub async fn acquire(&self, timeout: Duration) -> WorkerSlot {
        let Some(semaphore) = self.semaphore.clone() else {
            return WorkerSlot { _permit: None, in_flight: self.in_flight.clone(), counted: false };
        };

        self.queued.fetch_add(1, Ordering::Relaxed);
        let acquired = tokio::time::timeout(timeout, semaphore.acquire_owned()).await;
        self.queued.fetch_sub(1, Ordering::Relaxed);

        match acquired {
            Ok(Ok(permit)) => {
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                WorkerSlot { _permit: Some(permit), in_flight: self.in_flight.clone(), counted: true }
            }
            _ => WorkerSlot { _permit: None, in_flight: self.in_flight.clone(), counted: false },
        }
    }

    /// Grows or shrinks the worker count. Shrinking only removes permits
    /// that are currently free; workers already holding a permit keep
    /// running, so the pool converges to `n` as in-flight work finishes.
    pub fn resize(&self, n: usize) {
        let mut max_workers = self.max_workers.lock().unwrap();
        let Some(semaphore) = &self.semaphore else {
            *max_workers = n;
            return;
        };
        if n > *max_workers {
            semaphore.add_permits(n - *max_workers);
        } else if n < *max_workers {
            let shrink_by = (*max_workers - n).min(semaphore.available_permits());
            semaphore.forget_permits(shrink_by);
        }
        *max_workers = n;
    }

    /// `(max, active, queued)`, matching the governing design's `Stats()`.
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            *self.max_workers.lock().unwrap(),
            self.in_flight.load(Ordering::Relaxed),
            self.queued.load(Ordering::Relaxed),
        )
    }

    /// Submits `task` to the pool without waiting for a free slot; always
    /// spawns immediately.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let in_flight = self.in_flight.clone();
        let semaphore = self.semaphore.clone();
        in_flight.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            let _permit = match &semaphore {
                Some(s) => Some(s.clone().acquire_owned().await.expect("semaphore closed")),
                None => None,
            };
            task.await;
            in_flight.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Waits up to `timeout` for a free worker slot, running `task` inline on
    /// the caller if none becomes free in time.
    ///
    /// Returns `true` if the task ran on a pooled worker, `false` if it ran
    /// inline.
    pub async fn submit_wait<F>(&self, task: F, timeout: Duration) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(semaphore) = self.semaphore.clone() else {
            task.await;
            return false;
        };

        match tokio::time::timeout(timeout, semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                let in_flight = self.in_flight.clone();
                in_flight.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    let _permit = permit;
                    task.await;
                    in_flight.fetch_sub(1, Ordering::Relaxed);
                });
                true
            }
            _ => {
                task.await;
                false
            }
        }
    }

    /// Number of tasks currently running on pooled workers.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Boxes a future for callers that need a uniform task type; a small
    /// convenience mirroring `command_queue::AsyncCommandProcessor`'s
    /// boxed-future return type.
    pub fn boxed<F>(fut: F) -> BoxFuture
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Box::pin(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn submit_wait_runs_inline_when_exhausted() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicU32::new(0));

        let c1 = counter.clone();
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            c1.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let c2 = counter.clone();
        let ran_pooled = pool
            .submit_wait(
                async move {
                    c2.fetch_add(10, Ordering::SeqCst);
                },
                Duration::from_millis(10),
            )
            .await;
        assert!(!ran_pooled);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn disabled_pool_always_runs_inline() {
        let pool = WorkerPool::new(0);
        let ran_pooled = pool.submit_wait(async {}, Duration::from_millis(1)).await;
        assert!(!ran_pooled);
    }

    #[tokio::test]
    async fn acquire_bounds_concurrency() {
        let pool = WorkerPool::new(1);
        let slot1 = pool.acquire(Duration::from_millis(10)).await;
        assert_eq!(pool.stats(), (1, 1, 0));

        // Second acquire has no free permit and times out, falling back to
        // an uncounted slot rather than blocking forever.
        let slot2 = pool.acquire(Duration::from_millis(10)).await;
        assert_eq!(pool.in_flight(), 1);

        drop(slot1);
        drop(slot2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn resize_grows_and_shrinks_capacity() {
        let pool = WorkerPool::new(2);
        pool.resize(4);
        assert_eq!(pool.stats().0, 4);

        pool.resize(1);
        assert_eq!(pool.stats().0, 1);
        let _slot = pool.acquire(Duration::from_millis(10)).await;
        assert_eq!(pool.in_flight(), 1);
    }

    #[tokio::test]
    async fn disabled_pool_acquire_never_blocks() {
        let pool = WorkerPool::new(0);
        let _a = pool.acquire(Duration::from_millis(1)).await;
        let _b = pool.acquire(Duration::from_millis(1)).await;
        assert_eq!(pool.in_flight(), 0);
    }
}
