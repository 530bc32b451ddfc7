//! Bounded-concurrency fan-out with a single representative error.
//!
//! At most `concurrency` units are in flight. Every unit runs to completion
//! even after another has failed; only cancellation stops dispatch. The
//! error channel holds `concurrency` entries and failing units report with
//! `try_send`, so a completion never blocks: a full channel already holds a
//! representative error.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BulkError<E> {
    /// At least one unit failed. `error` is the first one observed during
    /// dispatch, or any queued one when all failures came later.
    #[error("{failed} of {total} units failed; unit {index}: {error}")]
    Unit {
        index: usize,
        error: E,
        failed: usize,
        total: usize,
    },

    #[error("a unit panicked: {0}")]
    Panicked(String),

    /// Dispatch stopped early. Units already started were allowed to finish.
    #[error("cancelled after dispatching {dispatched} of {total} units")]
    Cancelled { dispatched: usize, total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub total: usize,
    pub succeeded: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BulkExecutor {
    concurrency: usize,
}

/// Resolves once `cancel` flips to `true`; never when absent or when the
/// sender goes away without cancelling.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = cancel {
        if rx.wait_for(|flag| *flag).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

impl BulkExecutor {
    /// A zero bound is raised to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `work` over every unit and wait for all started units to finish.
    pub async fn run<T, F, Fut, E>(
        &self,
        units: Vec<T>,
        work: F,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<BulkReport, BulkError<E>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let total = units.len();
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let (err_tx, mut err_rx) = mpsc::channel::<(usize, E)>(self.concurrency);
        let failed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        let mut first: Option<(usize, E)> = None;
        let mut panicked: Option<String> = None;
        let mut dispatched = 0;
        let mut was_cancelled = false;

        for (index, unit) in units.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    was_cancelled = true;
                    break;
                }
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if first.is_none() {
                first = err_rx.try_recv().ok();
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    panicked.get_or_insert_with(|| e.to_string());
                }
            }

            let fut = work(unit);
            let err_tx = err_tx.clone();
            let failed = failed.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = fut.await {
                    failed.fetch_add(1, Ordering::Relaxed);
                    let _ = err_tx.try_send((index, e));
                }
            });
            dispatched += 1;
        }
        drop(err_tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                panicked.get_or_insert_with(|| e.to_string());
            }
        }

        let failed = failed.load(Ordering::Relaxed);
        debug!(total, dispatched, failed, "bulk run finished");

        if first.is_none() {
            first = err_rx.try_recv().ok();
        }
        if was_cancelled {
            if let Some((index, error)) = &first {
                warn!(index, failed, %error, "unit error superseded by cancellation");
            }
            warn!(total, dispatched, "bulk run cancelled");
            return Err(BulkError::Cancelled { dispatched, total });
        }
        if let Some((index, error)) = first {
            return Err(BulkError::Unit {
                index,
                error,
                failed,
                total,
            });
        }
        if let Some(reason) = panicked {
            return Err(BulkError::Panicked(reason));
        }
        Ok(BulkReport {
            total,
            succeeded: total,
        })
    }
}
