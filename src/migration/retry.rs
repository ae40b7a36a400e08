//! Retry policy with randomized exponential backoff.
//!
//! Every remote call made during export, import and rollback goes through
//! [`RetryPolicy::operation`]. The delay before retry `n` (0-based index of the
//! attempt that just failed) is
//!
//! ```text
//! min(min_backoff + (2^n - 1) * U(0.8, 1.2) * delta_backoff, max_backoff)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let groups = policy
//!     .operation(ResourceType::AffinityGroup, "all")
//!     .run(|| provider.list_affinity_groups())
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tracing::{debug, error, warn};

use super::error::{CloudError, MigrationError, Result};
use super::resource_type::ResourceType;

/// Cleanup run before every retry of a creation call
pub type CompensatingAction<'a> = Box<dyn Fn() -> BoxFuture<'a, ()> + Send + Sync + 'a>;

/// Numeric limits for retried remote operations
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub retry_count: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub delta_backoff: Duration,
    /// Upper bound for a single attempt; an attempt that exceeds it counts as abandoned
    pub operation_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 5,
            min_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(90),
            delta_backoff: Duration::from_secs(90),
            operation_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt`
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let growth = (2f64.powi(attempt.min(62) as i32) - 1.0) * jitter * self.delta_backoff.as_secs_f64();
        let seconds = (self.min_backoff.as_secs_f64() + growth).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Start describing a retried operation on one resource
    pub fn operation<'a>(
        &'a self,
        resource_type: ResourceType,
        resource_name: impl Into<String>,
    ) -> RetryOperation<'a> {
        RetryOperation {
            policy: self,
            resource_type,
            resource_name: resource_name.into(),
            prelude: None,
        }
    }
}

/// A single remote operation wrapped by a [`RetryPolicy`]
pub struct RetryOperation<'a> {
    policy: &'a RetryPolicy,
    resource_type: ResourceType,
    resource_name: String,
    prelude: Option<CompensatingAction<'a>>,
}

impl<'a> RetryOperation<'a> {
    /// Register a compensating action invoked before each retry (never before the first attempt)
    pub fn with_prelude<P>(mut self, prelude: P) -> Self
    where
        P: Fn() -> BoxFuture<'a, ()> + Send + Sync + 'a,
    {
        self.prelude = Some(Box::new(prelude));
        self
    }

    /// Run the action until it succeeds or the attempts are exhausted
    pub async fn run<T, F, Fut>(self, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CloudError>>,
    {
        let resource_type = self.resource_type;
        let name = self.resource_name.clone();
        match self.execute(false, action).await? {
            Some(value) => Ok(value),
            None => Err(MigrationError::NotFound {
                resource_type,
                name,
            }),
        }
    }

    /// Like [`run`](Self::run), but a "not found" answer yields `None` immediately
    pub async fn run_or_absent<T, F, Fut>(self, action: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CloudError>>,
    {
        self.execute(true, action).await
    }

    async fn execute<T, F, Fut>(self, ignore_not_found: bool, mut action: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CloudError>>,
    {
        let attempts_allowed = self.policy.retry_count.max(1);
        let mut failures = Vec::new();

        for attempt in 0..attempts_allowed {
            if attempt > 0
                && let Some(prelude) = &self.prelude
            {
                prelude().await;
            }

            let outcome = match self.policy.operation_timeout {
                Some(limit) => match tokio::time::timeout(limit, action()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(CloudError::Timeout(limit)),
                },
                None => action().await,
            };

            match outcome {
                Ok(value) => return Ok(Some(value)),
                Err(e) if ignore_not_found && e.is_not_found() => {
                    debug!(
                        resource_type = %self.resource_type,
                        resource_name = %self.resource_name,
                        "Resource not found, treating as absent"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    if attempt + 1 < attempts_allowed {
                        let jitter = rand::thread_rng().gen_range(0.8..1.2);
                        let delay = self.policy.backoff_delay(attempt, jitter);
                        warn!(
                            resource_type = %self.resource_type,
                            resource_name = %self.resource_name,
                            attempt = attempt + 1,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "Remote operation failed, retrying"
                        );
                        failures.push(e);
                        tokio::time::sleep(delay).await;
                    } else {
                        error!(
                            resource_type = %self.resource_type,
                            resource_name = %self.resource_name,
                            attempt = attempt + 1,
                            error = %e,
                            "Remote operation failed after max retries"
                        );
                        failures.push(e);
                    }
                }
            }
        }

        Err(MigrationError::RetriesExhausted {
            resource_type: self.resource_type,
            resource_name: self.resource_name,
            attempts: failures,
        })
    }
}
