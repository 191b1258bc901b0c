//! The retry policy: re-invoke a failed operation with optional backoff.
//!
//! An attempt budget of `max_retries` permits `max_retries + 1` invocations
//! in total. Unhandled errors short-circuit: they are returned untouched
//! without consuming the budget.

use crate::backoff::Backoff;
use crate::classifier::ErrorClassifier;
use crate::error::FailsafeError;
use crate::events::{EventListeners, RetryEvent};
use crate::{Operation, Policy};
use std::sync::Arc;
use tracing::debug;

/// A retry policy with a fixed attempt budget.
///
/// Construct via [`RetryPolicy::builder`].
pub struct RetryPolicy<E> {
    pub(crate) name: String,
    pub(crate) max_retries: usize,
    pub(crate) backoff: Option<Arc<dyn Backoff>>,
    pub(crate) classifier: Arc<dyn ErrorClassifier<FailsafeError<E>>>,
    pub(crate) listeners: EventListeners<RetryEvent>,
}

impl<E> RetryPolicy<E> {
    /// Returns a builder with default settings.
    pub fn builder() -> crate::config::RetryPolicyBuilder<E> {
        crate::config::RetryPolicyBuilder::new()
    }

    /// Runs `operation`, retrying handled failures up to the budget.
    ///
    /// On exhaustion the final handled error is wrapped in
    /// [`FailsafeError::RetriesExceeded`] with the total invocation count.
    pub async fn run<T>(&self, operation: &Operation<T, E>) -> Result<T, FailsafeError<E>> {
        let mut attempt: usize = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.listeners.emit(&RetryEvent::Succeeded {
                            name: self.name.clone(),
                            attempts: attempt,
                        });
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.classifier.should_handle(&error) {
                        self.listeners.emit(&RetryEvent::Ignored {
                            name: self.name.clone(),
                        });
                        return Err(error);
                    }
                    if attempt > self.max_retries {
                        debug!(retry = %self.name, attempts = attempt, "retries exhausted");
                        self.listeners.emit(&RetryEvent::Exhausted {
                            name: self.name.clone(),
                            attempts: attempt,
                        });
                        return Err(FailsafeError::RetriesExceeded {
                            attempts: attempt,
                            cause: Box::new(error),
                        });
                    }

                    let delay = self.backoff.as_ref().map(|b| b.for_attempt(attempt as u32));
                    debug!(retry = %self.name, attempt, ?delay, "retrying");
                    #[cfg(feature = "metrics")]
                    metrics::counter!("tripwire_retry_attempts_total",
                        "policy" => self.name.clone())
                    .increment(1);
                    self.listeners.emit(&RetryEvent::Retrying {
                        name: self.name.clone(),
                        attempt,
                        delay,
                    });
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl<T, E> Policy<T, E> for RetryPolicy<E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn wrap(self: Arc<Self>, inner: Operation<T, E>) -> Operation<T, E> {
        Arc::new(move || {
            let retry = Arc::clone(&self);
            let inner = Arc::clone(&inner);
            Box::pin(async move { retry.run(&inner).await })
        })
    }
}
