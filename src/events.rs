//! Event system for policy observability.
//!
//! Policies report state changes and call decisions through registered
//! listeners. Listeners run synchronously after the reported change has been
//! committed, under a no-throw contract: a panicking listener is caught and
//! isolated so it can never disturb the call path or the remaining listeners.

use crate::store::BreakerState;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// An event emitted by a resilience policy.
pub trait PolicyEvent: Send + Sync + fmt::Debug {
    /// A short token naming the event, e.g. `"state_transition"`.
    fn kind(&self) -> &'static str;
}

/// A listener for policy events.
pub trait EventListener<E: PolicyEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// An ordered collection of event listeners.
pub struct EventListeners<E: PolicyEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: PolicyEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener, catching panics so one
    /// misbehaving listener cannot starve the others or the caller.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: PolicyEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PolicyEvent> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

/// A listener backed by a closure.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: PolicyEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

/// Events emitted by a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker committed a state transition for its record.
    StateTransition {
        resource_key: String,
        namespace: String,
        from: BreakerState,
        to: BreakerState,
    },
    /// A call was allowed through.
    CallPermitted {
        resource_key: String,
        state: BreakerState,
    },
    /// A call was rejected because the circuit is open.
    CallBlocked { resource_key: String },
}

impl PolicyEvent for BreakerEvent {
    fn kind(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "state_transition",
            BreakerEvent::CallPermitted { .. } => "call_permitted",
            BreakerEvent::CallBlocked { .. } => "call_blocked",
        }
    }
}

/// Events emitted by a [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A failed attempt will be retried, after `delay` if backoff is set.
    Retrying {
        name: String,
        attempt: usize,
        delay: Option<Duration>,
    },
    /// The operation succeeded after `attempts` executions.
    Succeeded { name: String, attempts: usize },
    /// The retry budget is exhausted; the last error is being returned.
    Exhausted { name: String, attempts: usize },
    /// An error was not handled by the predicate and passed through.
    Ignored { name: String },
}

impl PolicyEvent for RetryEvent {
    fn kind(&self) -> &'static str {
        match self {
            RetryEvent::Retrying { .. } => "retrying",
            RetryEvent::Succeeded { .. } => "succeeded",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::Ignored { .. } => "ignored",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transition() -> BreakerEvent {
        BreakerEvent::StateTransition {
            resource_key: "db".into(),
            namespace: "default".into(),
            from: BreakerState::Closed,
            to: BreakerState::Open,
        }
    }

    #[test]
    fn emits_to_all_listeners() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut listeners = EventListeners::new();
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            listeners.add(FnListener::new(move |_: &BreakerEvent| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        listeners.emit(&transition());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_starve_the_rest() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &BreakerEvent| {
            panic!("listener bug");
        }));
        let counter = Arc::clone(&hits);
        listeners.add(FnListener::new(move |_: &BreakerEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&transition());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_kinds() {
        assert_eq!(transition().kind(), "state_transition");
        let retry = RetryEvent::Succeeded {
            name: "r".into(),
            attempts: 2,
        };
        assert_eq!(retry.kind(), "succeeded");
    }
}
