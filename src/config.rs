//! Builders for the resilience policies.
//!
//! Both builders follow the same shape: chainable setters with sensible
//! defaults, `on_*` convenience hooks for the common listener cases, and a
//! `build()` that resolves derived settings.

use crate::backoff::Backoff;
use crate::breaker::CircuitBreaker;
use crate::classifier::{ErrorClassifier, HandleAll};
use crate::error::FailsafeError;
use crate::events::{BreakerEvent, EventListener, EventListeners, FnListener, RetryEvent};
use crate::retry::RetryPolicy;
use crate::store::{BreakerState, BreakerStore, MemoryStore, DEFAULT_NAMESPACE};
use crate::window::Ratio;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`CircuitBreaker`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tripwire::{CircuitBreaker, Ratio};
///
/// let breaker: CircuitBreaker<std::io::Error> = CircuitBreaker::builder()
///     .resource_key("billing-api")
///     .failure_limit(Ratio::new(3, 10))
///     .cooldown(Duration::from_secs(30))
///     .build();
/// ```
pub struct CircuitBreakerBuilder<E> {
    resource_key: String,
    namespace: String,
    cooldown: Duration,
    failure_limit: Ratio,
    success_limit: Option<Ratio>,
    classifier: Arc<dyn ErrorClassifier<FailsafeError<E>>>,
    listeners: EventListeners<BreakerEvent>,
    store: Option<Arc<dyn BreakerStore>>,
}

impl<E> CircuitBreakerBuilder<E> {
    pub(crate) fn new() -> Self {
        Self {
            resource_key: "<unnamed>".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            cooldown: Duration::ZERO,
            failure_limit: Ratio::ONE,
            success_limit: None,
            classifier: Arc::new(HandleAll),
            listeners: EventListeners::new(),
            store: None,
        }
    }

    /// Identifies the protected resource; breakers sharing a store and a
    /// key share state.
    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = key.into();
        self
    }

    /// Scopes the resource key; different namespaces never share state.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// How long the circuit stays open before permitting a trial call.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Failure ratio that trips the circuit, e.g. `Ratio::new(3, 10)` for
    /// three failures in the last ten calls. Defaults to `1/1`.
    pub fn failure_limit(mut self, limit: Ratio) -> Self {
        self.failure_limit = limit;
        self
    }

    /// Success ratio required to close a half-open circuit. Defaults to
    /// the complement of the failure limit.
    pub fn success_limit(mut self, limit: Ratio) -> Self {
        self.success_limit = Some(limit);
        self
    }

    /// Restricts which errors count toward the failure ratio.
    pub fn handle<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier<FailsafeError<E>> + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Persists breaker state through `store` instead of process-local
    /// memory.
    pub fn store(mut self, store: Arc<dyn BreakerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers an arbitrary event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<BreakerEvent> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Convenience hook invoked on every committed state transition.
    pub fn on_state_transition<F>(self, f: F) -> Self
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(move |event: &BreakerEvent| {
            if let BreakerEvent::StateTransition { from, to, .. } = event {
                f(*from, *to);
            }
        }))
    }

    /// Convenience hook invoked whenever a call is rejected.
    pub fn on_call_blocked<F>(self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(move |event: &BreakerEvent| {
            if let BreakerEvent::CallBlocked { resource_key } = event {
                f(resource_key);
            }
        }))
    }

    pub fn build(self) -> CircuitBreaker<E> {
        let success_limit = self
            .success_limit
            .unwrap_or_else(|| self.failure_limit.complement());
        let window_capacity = self
            .failure_limit
            .denominator()
            .max(success_limit.denominator()) as usize;

        CircuitBreaker {
            resource_key: self.resource_key,
            namespace: self.namespace,
            cooldown: self.cooldown,
            failure_limit: self.failure_limit,
            success_limit,
            window_capacity,
            classifier: self.classifier,
            listeners: self.listeners,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
        }
    }
}

/// Builder for a [`RetryPolicy`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tripwire::{ExponentialBackoff, RetryPolicy};
///
/// let retry: RetryPolicy<std::io::Error> = RetryPolicy::builder()
///     .name("fetch-profile")
///     .max_retries(3)
///     .backoff(ExponentialBackoff::new(
///         Duration::from_millis(50),
///         Duration::from_secs(2),
///     ))
///     .build();
/// ```
pub struct RetryPolicyBuilder<E> {
    name: String,
    max_retries: usize,
    backoff: Option<Arc<dyn Backoff>>,
    classifier: Arc<dyn ErrorClassifier<FailsafeError<E>>>,
    listeners: EventListeners<RetryEvent>,
}

impl<E> RetryPolicyBuilder<E> {
    pub(crate) fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_retries: 3,
            backoff: None,
            classifier: Arc::new(HandleAll),
            listeners: EventListeners::new(),
        }
    }

    /// Names the policy for logs and events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Budget of re-invocations after the first attempt. Defaults to 3.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay between attempts. Without one, retries fire immediately.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Backoff + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Restricts which errors are retried.
    pub fn handle<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier<FailsafeError<E>> + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Registers an arbitrary event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Convenience hook invoked before each retry sleep.
    pub fn on_retry<F>(self, f: F) -> Self
    where
        F: Fn(usize, Option<Duration>) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Retrying { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }))
    }

    /// Convenience hook invoked when a retried operation finally succeeds.
    pub fn on_success<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Succeeded { attempts, .. } = event {
                f(*attempts);
            }
        }))
    }

    /// Convenience hook invoked when the budget runs out.
    pub fn on_exhausted<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }))
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            name: self.name,
            max_retries: self.max_retries,
            backoff: self.backoff,
            classifier: self.classifier,
            listeners: self.listeners,
        }
    }
}
