//! Bounded parallel fan-out within one tier.
//!
//! Every unit of a tier runs concurrently, limited by a semaphore. Units
//! borrow from the caller, so they are joined on the current task instead of
//! being spawned. The cancellation flag is checked before each unit starts.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use super::error::{MigrationError, Result};

/// Operator interruption shared between the signal handler and running work
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`MigrationError::Cancelled`] once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MigrationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of one unit of work
#[derive(Debug)]
pub struct UnitResult {
    /// Resource the unit worked on
    pub label: String,

    /// Error if the unit failed
    pub error: Option<MigrationError>,
}

impl UnitResult {
    pub fn success(label: String) -> Self {
        Self { label, error: None }
    }

    pub fn failure(label: String, error: MigrationError) -> Self {
        Self {
            label,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Run `worker` for every `(label, item)` with at most `max_parallelism` in flight
///
/// All units run to completion; their results come back in input order.
pub async fn run_units<T, F, Fut>(
    units: Vec<(String, T)>,
    max_parallelism: usize,
    cancel: &CancellationFlag,
    worker: F,
) -> Vec<UnitResult>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let semaphore = Arc::new(Semaphore::new(max_parallelism.max(1)));
    let worker = &worker;

    let tasks = units.into_iter().map(|(label, item)| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return UnitResult::failure(
                        label,
                        MigrationError::Document("worker pool closed".to_string()),
                    );
                }
            };
            if let Err(e) = cancel.check() {
                return UnitResult::failure(label, e);
            }
            debug!(unit = %label, "Unit started");
            match worker(item).await {
                Ok(()) => UnitResult::success(label),
                Err(e) => {
                    error!(unit = %label, error = %e, "Unit failed");
                    UnitResult::failure(label, e)
                }
            }
        }
    });

    join_all(tasks).await
}

/// Run a tier and fail with its first error
pub async fn run_tier<T, F, Fut>(
    units: Vec<(String, T)>,
    max_parallelism: usize,
    cancel: &CancellationFlag,
    worker: F,
) -> Result<usize>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let results = run_units(units, max_parallelism, cancel, worker).await;
    first_failure(results)
}

/// Number of completed units, or the first failure
pub fn first_failure(results: Vec<UnitResult>) -> Result<usize> {
    let completed = results.len();
    match results.into_iter().find_map(|r| r.error) {
        Some(e) => Err(e),
        None => Ok(completed),
    }
}
