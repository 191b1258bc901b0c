//! PostgreSQL store integration tests.
//!
//! These run only with the `postgres` feature enabled and a reachable
//! database described by the `TRIPWIRE_PG_*` environment variables;
//! otherwise each test is a no-op skip.

#![cfg(feature = "postgres")]

use std::time::Duration;
use tripwire::store::{BreakerRecord, BreakerState, BreakerStore, PgConfig, PostgresStore, SaveOutcome, SCHEMA_SQL};
use tripwire::{CircuitBreaker, Ratio};
use std::sync::Arc;

async fn connect_or_skip() -> Option<PostgresStore> {
    let config = match PgConfig::from_env() {
        Some(config) => config,
        None => {
            eprintln!("skipping: TRIPWIRE_PG_HOST / TRIPWIRE_PG_PASSWORD not set");
            return None;
        }
    };
    match PostgresStore::connect(&config).await {
        Ok(store) => {
            store.apply_schema().await.ok()?;
            Some(store)
        }
        Err(error) => {
            eprintln!("skipping: postgres unreachable: {error}");
            None
        }
    }
}

fn unique_key(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

#[tokio::test]
async fn schema_is_self_contained() {
    // The DDL must be runnable before anything else.
    assert!(SCHEMA_SQL.contains("tw_circuit_breakers"));
}

#[tokio::test]
async fn load_creates_a_default_closed_record() {
    let Some(store) = connect_or_skip().await else { return };
    let key = unique_key("pg-default");

    let record = store.load(&key, "default", 10).await.unwrap();
    assert_eq!(record.state, BreakerState::Closed);
    assert!(record.history.is_empty());
    assert!(record.open_until.is_none());
}

#[tokio::test]
async fn compare_and_save_commits_and_detects_conflicts() {
    let Some(store) = connect_or_skip().await else { return };
    let key = unique_key("pg-cas");

    let mut record = store.load(&key, "default", 10).await.unwrap();
    record.state = BreakerState::Open;
    record.open_until = Some(chrono::Utc::now() + chrono::TimeDelta::seconds(60));

    let outcome = store
        .compare_and_save(&key, "default", record.version, &record)
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Committed);

    // A writer still holding the pre-commit snapshot must now lose, even if
    // it never crossed a state boundary.
    let stale = BreakerRecord::new(10);
    let outcome = store
        .compare_and_save(&key, "default", record.version, &stale)
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Conflict);

    let reloaded = store.load(&key, "default", 10).await.unwrap();
    assert_eq!(reloaded.state, BreakerState::Open);
    assert_eq!(reloaded.version, record.version + 1);
    assert!(reloaded.open_until.is_some());
}

#[tokio::test]
async fn history_round_trips_through_the_database() {
    let Some(store) = connect_or_skip().await else { return };
    let key = unique_key("pg-history");

    let mut record = store.load(&key, "default", 5).await.unwrap();
    record.history.push(true);
    record.history.push(false);
    record.history.push(true);

    store
        .compare_and_save(&key, "default", record.version, &record)
        .await
        .unwrap();

    let reloaded = store.load(&key, "default", 5).await.unwrap();
    assert_eq!(reloaded.history, record.history);
    assert_eq!(reloaded.history.failures(), 1);

    // A concurrent writer that took the pre-commit snapshot stays CLOSED
    // too; only the version betrays that its history push is stale.
    let mut rival = BreakerRecord::new(5);
    rival.history.push(false);
    let outcome = store
        .compare_and_save(&key, "default", record.version, &rival)
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Conflict);

    let reloaded = store.load(&key, "default", 5).await.unwrap();
    assert_eq!(reloaded.history.failures(), 1);
}

#[tokio::test]
async fn breaker_trips_against_postgres() {
    let Some(store) = connect_or_skip().await else { return };
    let key = unique_key("pg-breaker");

    let breaker: CircuitBreaker<String> = CircuitBreaker::builder()
        .resource_key(key)
        .failure_limit(Ratio::new(2, 2))
        .cooldown(Duration::from_secs(60))
        .store(Arc::new(store))
        .build();

    breaker.record(false).await;
    breaker.record(false).await;
    assert_eq!(breaker.state().await, BreakerState::Open);
    assert!(breaker.guard().await.unwrap_err().is_circuit_open());
}
