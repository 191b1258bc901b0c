use thiserror::Error;

/// Errors surfaced by a policy-wrapped call.
#[derive(Debug, Error)]
pub enum FailsafeError<E> {
    /// The circuit is open and the cooldown has not elapsed; the protected
    /// operation was never executed.
    #[error("circuit is open; call not permitted")]
    CircuitOpen,

    /// The retry budget is exhausted. The last handled error is preserved
    /// by value in `cause`.
    #[error("retries exceeded after {} attempts: {}", attempts, cause)]
    RetriesExceeded {
        /// Total executions performed, including the initial attempt.
        attempts: usize,
        /// The error returned by the final attempt.
        cause: Box<FailsafeError<E>>,
    },

    /// An error raised by the protected operation itself, passed through
    /// untouched.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> FailsafeError<E> {
    /// Returns true if the call was blocked by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, FailsafeError::CircuitOpen)
    }

    /// Returns true if the retry budget was exhausted.
    pub fn is_retries_exceeded(&self) -> bool {
        matches!(self, FailsafeError::RetriesExceeded { .. })
    }

    /// Returns the operation's own error, unwrapping a retries-exceeded
    /// wrapper if one is present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            FailsafeError::Operation(e) => Some(e),
            FailsafeError::RetriesExceeded { cause, .. } => cause.into_inner(),
            FailsafeError::CircuitOpen => None,
        }
    }
}

/// Errors raised by a [`BreakerStore`](crate::store::BreakerStore) backend.
///
/// Internal to the engine: storage failures are absorbed by the local
/// fallback and never reach the wrapped business call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or the round-trip failed.
    #[error("breaker store unavailable: {0}")]
    Unavailable(String),

    /// The backend returned a record the engine cannot interpret.
    #[error("corrupt breaker record: {0}")]
    Corrupt(String),
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_helpers() {
        let err: FailsafeError<&str> = FailsafeError::CircuitOpen;
        assert!(err.is_circuit_open());
        assert_eq!(err.into_inner(), None);

        let err = FailsafeError::Operation("boom");
        assert!(!err.is_circuit_open());
        assert_eq!(err.into_inner(), Some("boom"));
    }

    #[test]
    fn retries_exceeded_preserves_cause() {
        let err: FailsafeError<&str> = FailsafeError::RetriesExceeded {
            attempts: 4,
            cause: Box::new(FailsafeError::Operation("flaky")),
        };
        assert!(err.is_retries_exceeded());
        let rendered = err.to_string();
        assert!(rendered.contains("4 attempts"));
        assert!(rendered.contains("flaky"));
        assert_eq!(err.into_inner(), Some("flaky"));
    }
}
