//! Bounded worker pool for batch reduction
//!
//! Each submitted batch becomes a task that waits for one of `workers`
//! semaphore permits and then runs its reduction on the blocking thread
//! pool. Outcomes come back in completion order, never submission order.
//!
//! Shutdown is graceful first: the semaphore is closed so no new batch
//! starts, and in-flight batches get `shutdown_timeout` to finish. After
//! that the shared `CancelSignal` interrupts running reductions and the pool
//! waits once more before giving up on whatever is left.

use super::accumulator::OverflowError;
use super::batch::Batch;
use super::reducer::LocalAggregate;
use crate::error::ErrorCode;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

/// Anything that can reduce one batch to a local aggregate
pub trait BatchReduce: Send + Sync + 'static {
    fn reduce(&self, batch: &Batch, cancel: &CancelSignal) -> Result<LocalAggregate, BatchFault>;
}

/// Cooperative cancellation flag shared by every batch of one pool
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
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

/// A batch whose contribution was lost
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchFault {
    #[error("batch reduction panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Overflow(#[from] OverflowError),

    #[error("batch was interrupted before it completed")]
    Cancelled,

    #[error("worker pool shut down before the batch started")]
    NotStarted,
}

impl BatchFault {
    fn from_join_error(err: JoinError) -> Self {
        if !err.is_panic() {
            return Self::Cancelled;
        }

        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// Result of one batch, successful or not
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_id: usize,
    pub rows: usize,
    pub result: Result<LocalAggregate, BatchFault>,
}

/// How the pool terminated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Running reductions had to be interrupted
    pub forced: bool,
    /// Batches still running when the pool gave up waiting
    pub abandoned: usize,
}

impl ShutdownReport {
    pub fn terminated(&self) -> bool {
        self.abandoned == 0
    }
}

/// Host parallelism, used when no worker count is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Fixed-size pool dispatching batches to a reducer
///
/// Must be driven from within a tokio runtime.
pub struct WorkerPool<R: BatchReduce> {
    workers: NonZeroUsize,
    reducer: Arc<R>,
    permits: Arc<Semaphore>,
    cancel: CancelSignal,
    in_flight: FuturesUnordered<BoxFuture<'static, BatchOutcome>>,
    submitted: usize,
}

impl<R: BatchReduce> WorkerPool<R> {
    pub fn new(workers: NonZeroUsize, reducer: R) -> Self {
        debug!(workers = workers.get(), "Starting worker pool");
        Self {
            workers,
            reducer: Arc::new(reducer),
            permits: Arc::new(Semaphore::new(workers.get())),
            cancel: CancelSignal::new(),
            in_flight: FuturesUnordered::new(),
            submitted: 0,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Batches submitted and not yet collected
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Queue a batch; never blocks the caller
    pub fn submit(&mut self, batch: Batch) {
        let batch_id = batch.id;
        let rows = batch.len();
        let handle = tokio::spawn(run_batch(
            self.permits.clone(),
            self.reducer.clone(),
            self.cancel.clone(),
            batch,
        ));

        self.submitted += 1;
        self.in_flight.push(
            async move {
                handle.await.unwrap_or_else(|e| BatchOutcome {
                    batch_id,
                    rows,
                    result: Err(BatchFault::from_join_error(e)),
                })
            }
            .boxed(),
        );
    }

    /// Wait for the next batch to complete; `None` once nothing is in flight
    pub async fn next_outcome(&mut self) -> Option<BatchOutcome> {
        self.in_flight.next().await
    }

    /// Stop accepting work and wait for in-flight batches
    ///
    /// Returns every outcome that completed during shutdown so callers can
    /// still merge them.
    pub async fn shutdown(mut self, timeout: Duration) -> (Vec<BatchOutcome>, ShutdownReport) {
        self.permits.close();
        let mut finished = Vec::new();

        if self.drain_within(timeout, &mut finished).await {
            return (finished, ShutdownReport::default());
        }

        warn!(
            in_flight = self.in_flight.len(),
            "Batches still running after {:?}, interrupting", timeout
        );
        self.cancel.cancel();

        if self.drain_within(timeout, &mut finished).await {
            return (
                finished,
                ShutdownReport {
                    forced: true,
                    abandoned: 0,
                },
            );
        }

        let abandoned = self.in_flight.len();
        error!(
            abandoned,
            "[E{:04}] Worker pool did not terminate after forced shutdown",
            ErrorCode::EXEC_SHUTDOWN_TIMEOUT
        );
        (
            finished,
            ShutdownReport {
                forced: true,
                abandoned,
            },
        )
    }

    async fn drain_within(&mut self, timeout: Duration, out: &mut Vec<BatchOutcome>) -> bool {
        let in_flight = &mut self.in_flight;
        tokio::time::timeout(timeout, async {
            while let Some(outcome) = in_flight.next().await {
                out.push(outcome);
            }
        })
        .await
        .is_ok()
    }
}

async fn run_batch<R: BatchReduce>(
    permits: Arc<Semaphore>,
    reducer: Arc<R>,
    cancel: CancelSignal,
    batch: Batch,
) -> BatchOutcome {
    let batch_id = batch.id;
    let rows = batch.len();

    let result = match permits.acquire_owned().await {
        Err(_) => Err(BatchFault::NotStarted),
        Ok(_) if cancel.is_cancelled() => Err(BatchFault::Cancelled),
        Ok(permit) => {
            let reduction = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                reducer.reduce(&batch, &cancel)
            });
            reduction
                .await
                .unwrap_or_else(|e| Err(BatchFault::from_join_error(e)))
        }
    };

    BatchOutcome {
        batch_id,
        rows,
        result,
    }
}
