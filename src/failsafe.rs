//! Policy composition.
//!
//! A [`Failsafe`] holds an ordered list of policies and wraps an operation
//! with all of them. The first policy added is outermost: with `retry` then
//! `breaker`, the retry drives the sequence and each individual attempt
//! passes through the breaker guard.

use crate::error::FailsafeError;
use crate::{Operation, Policy};
use std::sync::Arc;

/// An ordered composition of resilience policies.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tripwire::{CircuitBreaker, Failsafe, Ratio, RetryPolicy};
///
/// # async fn example() {
/// let failsafe: Failsafe<String, std::io::Error> = Failsafe::new()
///     .policy(Arc::new(RetryPolicy::builder().max_retries(2).build()))
///     .policy(Arc::new(
///         CircuitBreaker::builder()
///             .resource_key("profile-api")
///             .failure_limit(Ratio::new(3, 10))
///             .cooldown(Duration::from_secs(30))
///             .build(),
///     ));
///
/// let profile = failsafe
///     .run(|| async { Ok("profile".to_string()) })
///     .await;
/// # }
/// ```
pub struct Failsafe<T, E> {
    policies: Vec<Arc<dyn Policy<T, E>>>,
}

impl<T, E> Failsafe<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// An empty composition; calls pass through unchanged.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Appends a policy. Earlier policies wrap later ones.
    pub fn policy(mut self, policy: Arc<dyn Policy<T, E>>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Wraps `operation` with every registered policy, last-added innermost.
    pub fn wrap(&self, operation: Operation<T, E>) -> Operation<T, E> {
        let mut wrapped = operation;
        for policy in self.policies.iter().rev() {
            wrapped = Arc::clone(policy).wrap(wrapped);
        }
        wrapped
    }

    /// Lifts a plain async closure and runs it through the composition.
    pub async fn run<F, Fut>(&self, f: F) -> Result<T, FailsafeError<E>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, E>> + Send + 'static,
    {
        let operation: Operation<T, E> = Arc::new(move || {
            let fut = f();
            Box::pin(async move { fut.await.map_err(FailsafeError::Operation) })
        });
        self.call(&operation).await
    }

    /// Runs an already-lifted operation through the composition.
    pub async fn call(&self, operation: &Operation<T, E>) -> Result<T, FailsafeError<E>> {
        self.wrap(Arc::clone(operation))().await
    }
}

impl<T, E> Default for Failsafe<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
