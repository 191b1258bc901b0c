//! The circuit breaker policy.
//!
//! States: `CLOSED` (initial) → `OPEN` → `HALF_OPEN` → (`CLOSED` or `OPEN`).
//!
//! The transition logic is pure: [`CircuitBreaker::apply_outcome`] computes
//! the next record from whatever record it is handed. All shared-state
//! coordination happens in the store via compare-and-save loops, so the
//! record is never mutated outside a store commit and the protected call
//! itself always runs outside any lock.

use crate::classifier::ErrorClassifier;
use crate::error::FailsafeError;
use crate::events::{BreakerEvent, EventListeners};
use crate::store::{BreakerRecord, BreakerState, BreakerStore, SaveOutcome};
use crate::window::Ratio;
use crate::{Operation, Policy};
use chrono::{TimeDelta, Utc};
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How many times `record` replays its compare-and-save loop before
/// dropping the outcome. A conflict means another caller already moved the
/// record forward, so giving up is safe.
const RECORD_CAS_ATTEMPTS: usize = 3;

/// A circuit breaker guarding calls to one resource key.
///
/// Construct via [`CircuitBreaker::builder`].
pub struct CircuitBreaker<E> {
    pub(crate) resource_key: String,
    pub(crate) namespace: String,
    pub(crate) cooldown: Duration,
    pub(crate) failure_limit: Ratio,
    /// Resolved at build time: the configured success limit, or the
    /// conservative complement of `failure_limit`.
    pub(crate) success_limit: Ratio,
    /// History capacity: the larger of the two denominators.
    pub(crate) window_capacity: usize,
    pub(crate) classifier: Arc<dyn ErrorClassifier<FailsafeError<E>>>,
    pub(crate) listeners: EventListeners<BreakerEvent>,
    pub(crate) store: Arc<dyn BreakerStore>,
}

impl<E> CircuitBreaker<E> {
    /// Returns a builder with default settings.
    pub fn builder() -> crate::config::CircuitBreakerBuilder<E> {
        crate::config::CircuitBreakerBuilder::new()
    }

    /// Consults the record and decides whether a call may proceed.
    ///
    /// Open with an unexpired cooldown rejects the call without executing
    /// anything. Open with an expired cooldown transitions to half-open;
    /// the caller that wins that transition proceeds as the trial call, a
    /// loser re-reads and re-evaluates.
    pub async fn guard(&self) -> Result<(), FailsafeError<E>> {
        loop {
            let record = match self.load().await {
                Ok(record) => record,
                Err(()) => return Ok(()), // fail open; already logged
            };

            match record.state {
                BreakerState::Closed | BreakerState::HalfOpen => {
                    debug!(breaker = %self.resource_key, state = %record.state,
                        "call permitted");
                    self.listeners.emit(&BreakerEvent::CallPermitted {
                        resource_key: self.resource_key.clone(),
                        state: record.state,
                    });
                    return Ok(());
                }
                BreakerState::Open => {
                    let now = Utc::now();
                    if matches!(record.open_until, Some(until) if now < until) {
                        debug!(breaker = %self.resource_key, "call blocked; circuit open");
                        #[cfg(feature = "metrics")]
                        counter!("tripwire_breaker_calls_total",
                            "breaker" => self.resource_key.clone(), "outcome" => "blocked")
                        .increment(1);
                        self.listeners.emit(&BreakerEvent::CallBlocked {
                            resource_key: self.resource_key.clone(),
                        });
                        return Err(FailsafeError::CircuitOpen);
                    }

                    // Cooldown elapsed: try to win the half-open transition.
                    let mut next = record.clone();
                    next.state = BreakerState::HalfOpen;
                    next.open_until = None;
                    next.history.clear();
                    match self.save(record.version, &next).await {
                        Ok(SaveOutcome::Committed) => {
                            self.transitioned(BreakerState::Open, BreakerState::HalfOpen);
                            self.listeners.emit(&BreakerEvent::CallPermitted {
                                resource_key: self.resource_key.clone(),
                                state: BreakerState::HalfOpen,
                            });
                            return Ok(());
                        }
                        Ok(SaveOutcome::Conflict) => continue,
                        Err(()) => return Ok(()),
                    }
                }
            }
        }
    }

    /// Records a call outcome and applies any resulting transition.
    ///
    /// Only handled outcomes reach this method; unhandled errors bypass the
    /// breaker entirely. Under a lost compare-and-save race the outcome is
    /// dropped rather than re-fought indefinitely.
    pub async fn record(&self, success: bool) {
        for _ in 0..RECORD_CAS_ATTEMPTS {
            let record = match self.load().await {
                Ok(record) => record,
                Err(()) => return,
            };

            let mut next = record.clone();
            let transition = self.apply_outcome(&mut next, success);
            if transition.is_none() && next == record {
                // Outcome arrived while open (lost race): nothing to persist.
                return;
            }

            match self.save(record.version, &next).await {
                Ok(SaveOutcome::Committed) => {
                    if let Some((from, to)) = transition {
                        self.transitioned(from, to);
                    }
                    return;
                }
                Ok(SaveOutcome::Conflict) => continue,
                Err(()) => return,
            }
        }
        debug!(breaker = %self.resource_key, "outcome dropped after repeated save conflicts");
    }

    /// Wraps `guard` + execute + classify + `record` around one operation.
    pub async fn call<T>(&self, operation: &Operation<T, E>) -> Result<T, FailsafeError<E>> {
        self.guard().await?;
        let result = operation().await;
        match &result {
            Ok(_) => self.record(true).await,
            Err(error) => {
                if self.classifier.should_handle(error) {
                    self.record(false).await;
                }
                // Unhandled: neither recorded nor transformed.
            }
        }
        result
    }

    /// Current state of the record; a failing store reads as closed.
    pub async fn state(&self) -> BreakerState {
        match self.load().await {
            Ok(record) => record.state,
            Err(()) => BreakerState::Closed,
        }
    }

    /// Forces the breaker back to closed, clearing its history.
    pub async fn reset(&self) {
        loop {
            let record = match self.load().await {
                Ok(record) => record,
                Err(()) => return,
            };
            if record.state == BreakerState::Closed {
                return;
            }

            let mut next = BreakerRecord::new(self.window_capacity);
            next.updated_at = record.updated_at;
            match self.save(record.version, &next).await {
                Ok(SaveOutcome::Committed) => {
                    self.transitioned(record.state, BreakerState::Closed);
                    return;
                }
                Ok(SaveOutcome::Conflict) => continue,
                Err(()) => return,
            }
        }
    }

    /// Pure transition logic: pushes the outcome into the record and
    /// returns the transition it causes, if any.
    fn apply_outcome(
        &self,
        record: &mut BreakerRecord,
        success: bool,
    ) -> Option<(BreakerState, BreakerState)> {
        match record.state {
            // Only reachable via a lost race; the call was never permitted
            // under this state, so the outcome is not sampled.
            BreakerState::Open => None,

            BreakerState::Closed => {
                record.history.push(success);
                let window = self.failure_limit.denominator() as usize;
                if record.history.len() >= window {
                    let failures = record.history.failures_in_last(window);
                    if self.failure_limit.is_met_by(failures, window) {
                        self.trip(record);
                        return Some((BreakerState::Closed, BreakerState::Open));
                    }
                }
                None
            }

            BreakerState::HalfOpen => {
                // No averaging during the trial: one failure reopens.
                if !success {
                    self.trip(record);
                    return Some((BreakerState::HalfOpen, BreakerState::Open));
                }
                record.history.push(true);
                let window = self.success_limit.denominator() as usize;
                if record.history.len() >= window {
                    let successes = record.history.successes_in_last(window);
                    if self.success_limit.is_met_by(successes, window) {
                        record.state = BreakerState::Closed;
                        record.open_until = None;
                        record.history.clear();
                        return Some((BreakerState::HalfOpen, BreakerState::Closed));
                    }
                }
                None
            }
        }
    }

    fn trip(&self, record: &mut BreakerRecord) {
        record.state = BreakerState::Open;
        record.open_until =
            Some(Utc::now() + TimeDelta::from_std(self.cooldown).unwrap_or(TimeDelta::MAX));
        record.history.clear();
    }

    async fn load(&self) -> Result<BreakerRecord, ()> {
        self.store
            .load(&self.resource_key, &self.namespace, self.window_capacity)
            .await
            .map_err(|error| {
                // Storage failures must never reach the business call.
                tracing::error!(breaker = %self.resource_key, %error,
                    "breaker store failed; treating call as permitted");
            })
    }

    async fn save(&self, expected_version: u64, record: &BreakerRecord) -> Result<SaveOutcome, ()> {
        self.store
            .compare_and_save(&self.resource_key, &self.namespace, expected_version, record)
            .await
            .map_err(|error| {
                tracing::error!(breaker = %self.resource_key, %error,
                    "breaker store failed; outcome not persisted");
            })
    }

    /// Reports a committed transition: log, then metrics, then listeners,
    /// all after the store write.
    fn transitioned(&self, from: BreakerState, to: BreakerState) {
        tracing::info!(breaker = %self.resource_key, namespace = %self.namespace,
            %from, %to, "circuit state transition");

        #[cfg(feature = "metrics")]
        counter!("tripwire_breaker_transitions_total",
            "breaker" => self.resource_key.clone(),
            "from" => from.as_str(), "to" => to.as_str())
        .increment(1);

        self.listeners.emit(&BreakerEvent::StateTransition {
            resource_key: self.resource_key.clone(),
            namespace: self.namespace.clone(),
            from,
            to,
        });
    }
}

impl<T, E> Policy<T, E> for CircuitBreaker<E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn wrap(self: Arc<Self>, inner: Operation<T, E>) -> Operation<T, E> {
        Arc::new(move || {
            let breaker = Arc::clone(&self);
            let inner = Arc::clone(&inner);
            Box::pin(async move { breaker.call(&inner).await })
        })
    }
}
