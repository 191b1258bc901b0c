//! Error classification for policy accounting.
//!
//! Both the circuit breaker and the retry policy consult an
//! [`ErrorClassifier`] before counting an error. Errors the classifier
//! rejects are neither recorded nor retried: they propagate to the caller
//! verbatim and leave the policy untouched.

use std::sync::Arc;

/// Decides whether a policy should handle (count) a given error.
///
/// Implementations must be pure and side-effect free.
pub trait ErrorClassifier<E>: Send + Sync {
    /// Returns `true` if the error counts toward breaker/retry accounting.
    fn should_handle(&self, error: &E) -> bool;
}

/// The default classifier: every error is handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleAll;

impl<E> ErrorClassifier<E> for HandleAll {
    fn should_handle(&self, _error: &E) -> bool {
        true
    }
}

/// A classifier backed by a closure.
///
/// # Example
///
/// ```rust
/// use tripwire::{ErrorClassifier, FnClassifier};
///
/// // Only transient errors count.
/// let classifier = FnClassifier::new(|error: &String| error.contains("transient"));
/// assert!(classifier.should_handle(&"transient timeout".to_string()));
/// assert!(!classifier.should_handle(&"bad request".to_string()));
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, E> ErrorClassifier<E> for FnClassifier<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_handle(&self, error: &E) -> bool {
        (self.f)(error)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("f", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_all_handles_everything() {
        assert!(ErrorClassifier::<()>::should_handle(&HandleAll, &()));
        assert!(HandleAll.should_handle(&"anything"));
    }

    #[test]
    fn fn_classifier_filters() {
        let classifier = FnClassifier::new(|code: &u16| *code >= 500);
        assert!(classifier.should_handle(&503));
        assert!(!classifier.should_handle(&404));
    }
}
