//! Resilience policies for async operations: circuit breaking, retry with
//! backoff, and policy composition, backed by pluggable state storage.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tripwire::{CircuitBreaker, ExponentialBackoff, Failsafe, Ratio, RetryPolicy};
//!
//! # async fn example() -> Result<(), tripwire::FailsafeError<std::io::Error>> {
//! let failsafe: Failsafe<String, std::io::Error> = Failsafe::new()
//!     .policy(Arc::new(
//!         RetryPolicy::builder()
//!             .name("fetch")
//!             .max_retries(3)
//!             .backoff(ExponentialBackoff::new(
//!                 Duration::from_millis(50),
//!                 Duration::from_secs(2),
//!             ))
//!             .build(),
//!     ))
//!     .policy(Arc::new(
//!         CircuitBreaker::builder()
//!             .resource_key("payments-api")
//!             .failure_limit(Ratio::new(3, 10))
//!             .cooldown(Duration::from_secs(30))
//!             .build(),
//!     ));
//!
//! let _body = failsafe.run(|| async { Ok("ok".to_string()) }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Every policy implements [`Policy`]: it wraps an [`Operation`] and
//! returns a new one with the policy's behavior layered on. Circuit breaker
//! state lives in a [`BreakerStore`](store::BreakerStore); the in-memory
//! store is the default, and a row-locking relational store (behind the
//! `postgres` feature) lets independent processes share one circuit.
//! All stores commit through compare-and-save, so concurrent writers
//! coordinate without ever holding a lock across the protected call.

pub mod backoff;
pub mod classifier;
pub mod events;
pub mod store;

mod breaker;
mod config;
mod error;
mod failsafe;
mod retry;
mod window;

pub use backoff::{Backoff, ExponentialBackoff, FixedDelay};
pub use breaker::CircuitBreaker;
pub use classifier::{ErrorClassifier, FnClassifier, HandleAll};
pub use config::{CircuitBreakerBuilder, RetryPolicyBuilder};
pub use error::{FailsafeError, StoreError};
pub use failsafe::Failsafe;
pub use retry::RetryPolicy;
pub use store::{store_from_env, BreakerState, BreakerStore};
pub use window::{OutcomeWindow, Ratio};

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// The future produced by one invocation of an [`Operation`].
pub type OperationFuture<T, E> = BoxFuture<'static, Result<T, FailsafeError<E>>>;

/// A re-invocable async operation.
///
/// Policies need to call the underlying work more than once (retry) or not
/// at all (open circuit), so operations are shared closures producing a
/// fresh future per invocation rather than single futures.
pub type Operation<T, E> = Arc<dyn Fn() -> OperationFuture<T, E> + Send + Sync>;

/// A resilience policy: wraps an operation in its behavior.
pub trait Policy<T, E>: Send + Sync {
    fn wrap(self: Arc<Self>, inner: Operation<T, E>) -> Operation<T, E>;
}

/// Lifts an async closure into an [`Operation`].
///
/// ```rust
/// use tripwire::{operation, Operation};
///
/// let op: Operation<u32, String> = operation(|| async { Ok(7) });
/// ```
pub fn operation<T, E, F, Fut>(f: F) -> Operation<T, E>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FailsafeError<E>>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}
