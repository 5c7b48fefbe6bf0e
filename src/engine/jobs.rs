//! Small fixed-size worker pool backing parallel view traversal.
//!
//! The queue wraps a dedicated Rayon thread pool. Parallel `for_each`
//! partitions its index range into one contiguous slice per worker and
//! joins on scope exit, so dispatch returns only when every slice has
//! completed. Within a worker, indices are visited in ascending order; no
//! ordering is guaranteed across workers.

use crate::engine::error::{ECSResult, JobQueueError};

/// Worker pool used by parallel views.
///
/// A queue can be shared between any number of views; each dispatch is a
/// self-contained fork/join.
pub struct JobQueue {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl JobQueue {
    /// Creates a queue with one worker per hardware thread.
    pub fn new() -> ECSResult<Self> {
        Self::with_workers(0)
    }

    /// Creates a queue with an explicit worker count.
    ///
    /// `0` selects the hardware concurrency.
    pub fn with_workers(workers: usize) -> ECSResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| JobQueueError {
                reason: e.to_string(),
            })?;
        let workers = pool.current_num_threads();
        log::debug!("job queue created with {} workers", workers);
        Ok(Self { pool, workers })
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `visit` for every index in `0..len`, partitioned across the
    /// workers. Returns when all partitions have completed.
    pub(crate) fn dispatch(
        &self,
        len: usize,
        visit: impl Fn(usize) + Send + Sync,
    ) {
        if len == 0 {
            return;
        }

        let slices = self.workers.min(len);
        let chunk = (len + slices - 1) / slices;
        let visit = &visit;

        self.pool.scope(|scope| {
            for slice in 0..slices {
                let start = slice * chunk;
                let end = ((slice + 1) * chunk).min(len);
                scope.spawn(move |_| {
                    for index in start..end {
                        visit(index);
                    }
                });
            }
        });
    }
}
