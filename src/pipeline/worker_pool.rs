//! Bounded fan-out for bulk artifact I/O inside a stage handler.
//!
//! Handlers fan out per-member work through the pool and join before they
//! return, so the processing loop stays the only place batch state moves.

use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::config::WorkerPoolConfig;

/// Concurrency limit for per-member work
///
/// # Examples
///
/// ```rust
/// use submission_pipeline::pipeline::WorkerPool;
///
/// # tokio_test::block_on(async {
/// let pool = WorkerPool::new(4);
/// let doubled = pool.map_bounded(1..=5, |n| async move { n * 2 }).await;
/// assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
/// # });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn from_config(config: &WorkerPoolConfig) -> Self {
        Self::new(config.effective_size())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` over every item with at most `size` futures in flight.
    /// Results come back in input order.
    pub async fn map_bounded<I, F, Fut, T>(&self, items: I, f: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(items).map(f).buffered(self.size).collect().await
    }
}
