//! Fixed-size worker pool for parallel command recording.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{RenderError, Result};

/// Renderer-wide flag that asks in-flight recording tasks to stop early.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A fixed set of worker threads running fork-join batches.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Spawn `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(RenderError::Config(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lumen-record-{i}"))
            .build()
            .map_err(|e| RenderError::Config(format!("failed to spawn workers: {e}")))?;

        tracing::info!(threads, "Recording worker pool started");
        Ok(Self { pool, threads })
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Run `task(i, input_i)` for every input on the pool and wait for all
    /// of them. Results come back in input order regardless of the order in
    /// which tasks finish.
    pub fn fork_join<I, T, F>(&self, inputs: Vec<I>, task: F) -> Vec<T>
    where
        I: Send,
        T: Send,
        F: Fn(usize, I) -> T + Sync,
    {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(inputs.len()).collect();
        let task = &task;

        self.pool.scope(|scope| {
            for ((index, input), slot) in inputs.into_iter().enumerate().zip(slots.iter_mut()) {
                scope.spawn(move |_| {
                    *slot = Some(task(index, input));
                });
            }
        });

        // The scope joins every task, so each slot is filled.
        slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn zero_threads_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(RenderError::Config(_))));
    }

    #[test]
    fn results_in_input_order_despite_finish_order() {
        let pool = WorkerPool::new(4).unwrap();
        let finished = AtomicUsize::new(0);

        // Earlier inputs sleep longer, so they finish last.
        let results = pool.fork_join((0..4u64).collect(), |index, input| {
            std::thread::sleep(Duration::from_millis(40 - input * 10));
            let rank = finished.fetch_add(1, Ordering::SeqCst);
            (index, input * 100, rank)
        });

        let order: Vec<(usize, u64)> = results.iter().map(|&(i, v, _)| (i, v)).collect();
        assert_eq!(order, vec![(0, 0), (1, 100), (2, 200), (3, 300)]);
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn tasks_get_exclusive_mutable_inputs() {
        let pool = WorkerPool::new(3).unwrap();
        let mut counters = vec![0u32; 3];

        let inputs: Vec<&mut u32> = counters.iter_mut().collect();
        pool.fork_join(inputs, |index, counter| {
            *counter += index as u32 + 1;
        });

        assert_eq!(counters, vec![1, 2, 3]);
    }

    #[test]
    fn empty_batch() {
        let pool = WorkerPool::new(2).unwrap();
        let results: Vec<u8> = pool.fork_join(Vec::<u8>::new(), |_, x| x);
        assert!(results.is_empty());
    }

    #[test]
    fn cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
