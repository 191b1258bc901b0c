//! Transparent local fallback for an unreliable shared store.

use super::{BreakerRecord, BreakerStore, MemoryStore, SaveOutcome};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wraps a primary store and degrades to a process-local [`MemoryStore`]
/// whenever the primary fails.
///
/// Storage connectivity errors never reach the wrapped business call: the
/// failing operation is transparently retried against the local store, which
/// is infallible. One warning is logged per failure episode; the episode
/// ends as soon as the primary answers again.
pub struct FallbackStore {
    primary: Arc<dyn BreakerStore>,
    local: MemoryStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn BreakerStore>) -> Self {
        Self {
            primary,
            local: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the store is currently serving from process-local state.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn degrade(&self, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!(%error,
                "breaker store unavailable; falling back to process-local state");
        }
    }

    fn recover(&self) {
        if self.degraded.swap(false, Ordering::SeqCst) {
            tracing::info!("breaker store reachable again");
        }
    }
}

#[async_trait]
impl BreakerStore for FallbackStore {
    async fn load(
        &self,
        resource_key: &str,
        namespace: &str,
        window_capacity: usize,
    ) -> Result<BreakerRecord, StoreError> {
        match self.primary.load(resource_key, namespace, window_capacity).await {
            Ok(record) => {
                self.recover();
                Ok(record)
            }
            Err(error) => {
                self.degrade(&error);
                self.local.load(resource_key, namespace, window_capacity).await
            }
        }
    }

    async fn compare_and_save(
        &self,
        resource_key: &str,
        namespace: &str,
        expected_version: u64,
        record: &BreakerRecord,
    ) -> Result<SaveOutcome, StoreError> {
        match self
            .primary
            .compare_and_save(resource_key, namespace, expected_version, record)
            .await
        {
            Ok(outcome) => {
                self.recover();
                Ok(outcome)
            }
            Err(error) => {
                self.degrade(&error);
                self.local
                    .compare_and_save(resource_key, namespace, expected_version, record)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BreakerState;

    /// A primary that fails every call.
    struct UnreachableStore;

    #[async_trait]
    impl BreakerStore for UnreachableStore {
        async fn load(
            &self,
            _resource_key: &str,
            _namespace: &str,
            _window_capacity: usize,
        ) -> Result<BreakerRecord, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn compare_and_save(
            &self,
            _resource_key: &str,
            _namespace: &str,
            _expected_version: u64,
            _record: &BreakerRecord,
        ) -> Result<SaveOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn serves_local_state_when_primary_is_down() {
        let store = FallbackStore::new(Arc::new(UnreachableStore));
        assert!(!store.is_degraded());

        let mut record = store.load("api", "default", 4).await.unwrap();
        assert!(store.is_degraded());

        record.state = BreakerState::Open;
        let outcome = store
            .compare_and_save("api", "default", record.version, &record)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Committed);

        // Local state persists across calls within the process.
        let reloaded = store.load("api", "default", 4).await.unwrap();
        assert_eq!(reloaded.state, BreakerState::Open);
    }

    /// A primary that fails its first call, then recovers.
    struct FlakyStore {
        failed_once: AtomicBool,
        inner: MemoryStore,
    }

    #[async_trait]
    impl BreakerStore for FlakyStore {
        async fn load(
            &self,
            resource_key: &str,
            namespace: &str,
            window_capacity: usize,
        ) -> Result<BreakerRecord, StoreError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("transient outage".into()));
            }
            self.inner.load(resource_key, namespace, window_capacity).await
        }

        async fn compare_and_save(
            &self,
            resource_key: &str,
            namespace: &str,
            expected_version: u64,
            record: &BreakerRecord,
        ) -> Result<SaveOutcome, StoreError> {
            self.inner
                .compare_and_save(resource_key, namespace, expected_version, record)
                .await
        }
    }

    #[tokio::test]
    async fn episode_ends_when_primary_recovers() {
        let store = FallbackStore::new(Arc::new(FlakyStore {
            failed_once: AtomicBool::new(false),
            inner: MemoryStore::new(),
        }));

        let _ = store.load("api", "default", 4).await.unwrap();
        assert!(store.is_degraded());

        let _ = store.load("api", "default", 4).await.unwrap();
        assert!(!store.is_degraded());
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn logs_exactly_one_warning_per_failure_episode() {
        let output = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(output.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = FallbackStore::new(Arc::new(UnreachableStore));
        for _ in 0..5 {
            let _ = store.load("api", "default", 4).await.unwrap();
        }

        let logs = output.contents();
        assert_eq!(
            logs.matches("falling back to process-local state").count(),
            1,
            "expected a single warning for the whole episode, got:\n{logs}"
        );
    }
}
