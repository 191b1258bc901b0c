//! Breaker state storage.
//!
//! A [`BreakerStore`] persists one [`BreakerRecord`] per `(resource_key,
//! namespace)` pair and exposes an atomic read-modify-write primitive:
//! [`compare_and_save`](BreakerStore::compare_and_save) commits a new record
//! only if the stored version still matches the version the caller read.
//! Every commit bumps the version, so two concurrent writers working from
//! the same snapshot resolve to exactly one winner even when neither crosses
//! a state boundary, and no history push can be silently overwritten.
//!
//! The state machine itself is pure logic over whatever record it is handed;
//! linearizability per key is enforced entirely here.

use crate::error::StoreError;
use crate::window::OutcomeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

mod fallback;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use fallback::FallbackStore;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgConfig, PostgresStore, SCHEMA_SQL};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The three circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; calls pass through.
    Closed,
    /// Tripped; calls are rejected until the cooldown elapses.
    Open,
    /// Probing recovery; calls are allowed and evaluated strictly.
    HalfOpen,
}

impl BreakerState {
    /// The fixed token persisted by relational backends.
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Parses a persisted state token.
    pub fn parse(token: &str) -> Result<Self, StoreError> {
        match token {
            "CLOSED" => Ok(BreakerState::Closed),
            "OPEN" => Ok(BreakerState::Open),
            "HALF_OPEN" => Ok(BreakerState::HalfOpen),
            other => Err(StoreError::Corrupt(format!(
                "unknown breaker state token {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable state of one breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerRecord {
    pub state: BreakerState,
    /// Ring buffer of recent call outcomes.
    pub history: OutcomeWindow,
    /// End of the cooldown; set only while `state` is [`BreakerState::Open`].
    pub open_until: Option<DateTime<Utc>>,
    /// Write counter, bumped by the store on every committed save. The
    /// compare-and-save token: a writer holding a stale version loses.
    pub version: u64,
    /// Refreshed by the store on every committed save.
    pub updated_at: DateTime<Utc>,
}

impl BreakerRecord {
    /// A fresh record: closed, empty history of the given capacity.
    pub fn new(window_capacity: usize) -> Self {
        Self {
            state: BreakerState::Closed,
            history: OutcomeWindow::new(window_capacity),
            open_until: None,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Result of a [`compare_and_save`](BreakerStore::compare_and_save).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record was written.
    Committed,
    /// The stored version no longer matched `expected_version`; nothing was
    /// written.
    Conflict,
}

/// Persistence backend for breaker records.
#[async_trait]
pub trait BreakerStore: Send + Sync {
    /// Fetches the record for `(resource_key, namespace)`, creating a
    /// default closed record with a history of `window_capacity` outcomes
    /// if none exists yet.
    async fn load(
        &self,
        resource_key: &str,
        namespace: &str,
        window_capacity: usize,
    ) -> Result<BreakerRecord, StoreError>;

    /// Atomically replaces the stored record, but only if its current
    /// version still equals `expected_version`. A commit bumps the stored
    /// version to `expected_version + 1` and refreshes `updated_at`.
    async fn compare_and_save(
        &self,
        resource_key: &str,
        namespace: &str,
        expected_version: u64,
        record: &BreakerRecord,
    ) -> Result<SaveOutcome, StoreError>;
}

/// Builds the store described by the environment.
///
/// With the `postgres` feature enabled and `TRIPWIRE_PG_HOST` plus
/// `TRIPWIRE_PG_PASSWORD` set, returns a PostgreSQL-backed store wrapped in
/// a [`FallbackStore`], so later connectivity failures degrade to
/// process-local state instead of surfacing. If the initial connection
/// fails, or without connection parameters, returns a plain
/// [`MemoryStore`].
pub async fn store_from_env() -> Arc<dyn BreakerStore> {
    #[cfg(feature = "postgres")]
    if let Some(config) = PgConfig::from_env() {
        match PostgresStore::connect(&config).await {
            Ok(store) => {
                tracing::info!(host = %config.host, dbname = %config.dbname,
                    "using postgres breaker store");
                return Arc::new(FallbackStore::new(Arc::new(store)));
            }
            Err(error) => {
                tracing::warn!(%error,
                    "postgres breaker store unreachable; using in-memory store");
            }
        }
    }
    Arc::new(MemoryStore::new())
}
