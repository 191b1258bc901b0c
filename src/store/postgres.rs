//! Shared breaker store backed by PostgreSQL.
//!
//! One record per `(resource_key, namespace)` row. A `compare_and_save` is a
//! single transaction that inserts the row with defaults if absent, locks it
//! with `SELECT ... FOR UPDATE`, compares the stored version against the
//! caller's expectation, and updates the row with a bumped version. The row
//! lock serializes concurrent writers; the version check rejects any writer
//! whose snapshot went stale between its `load` and its save.
//!
//! Provisioning the table is an operational concern; [`SCHEMA_SQL`] carries
//! the expected DDL. Connection management beyond a single client is also
//! out of scope here: wrap this store in a
//! [`FallbackStore`](super::FallbackStore) so connectivity failures degrade
//! to process-local state instead of surfacing.

use super::{BreakerRecord, BreakerState, BreakerStore, SaveOutcome};
use crate::error::StoreError;
use crate::window::OutcomeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

/// DDL for the breaker table, for use by external provisioning tooling.
pub const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS tw_circuit_breakers (
    resource_key  VARCHAR(255) NOT NULL,
    namespace     VARCHAR(255) NOT NULL DEFAULT 'default',
    state         VARCHAR(20)  NOT NULL CHECK (state IN ('CLOSED', 'OPEN', 'HALF_OPEN')),
    failure_count INTEGER      NOT NULL DEFAULT 0 CHECK (failure_count >= 0),
    history       TEXT         NOT NULL DEFAULT '',
    version       BIGINT       NOT NULL DEFAULT 0,
    open_until    TIMESTAMPTZ,
    created_at    TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
    PRIMARY KEY (resource_key, namespace)
);
CREATE INDEX IF NOT EXISTS idx_tw_circuit_breakers_state
    ON tw_circuit_breakers (state);
CREATE INDEX IF NOT EXISTS idx_tw_circuit_breakers_open_until
    ON tw_circuit_breakers (open_until) WHERE open_until IS NOT NULL;
";

const INSERT_DEFAULT_SQL: &str = "\
INSERT INTO tw_circuit_breakers (resource_key, namespace, state)
VALUES ($1, $2, 'CLOSED')
ON CONFLICT (resource_key, namespace) DO NOTHING";

/// Connection parameters for the shared store.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl PgConfig {
    /// Reads connection parameters from `TRIPWIRE_PG_*` environment
    /// variables. Returns `None` unless both `TRIPWIRE_PG_HOST` and
    /// `TRIPWIRE_PG_PASSWORD` are set; port, database and user have
    /// defaults.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("TRIPWIRE_PG_HOST").ok()?;
        let password = std::env::var("TRIPWIRE_PG_PASSWORD").ok()?;
        let port = std::env::var("TRIPWIRE_PG_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432);
        let dbname =
            std::env::var("TRIPWIRE_PG_DBNAME").unwrap_or_else(|_| "tripwire".to_owned());
        let user = std::env::var("TRIPWIRE_PG_USER").unwrap_or_else(|_| "postgres".to_owned());
        Some(Self {
            host,
            port,
            dbname,
            user,
            password,
        })
    }

    fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.dbname, self.user, self.password
        )
    }
}

/// A [`BreakerStore`] persisting records as rows in PostgreSQL.
pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    /// Wraps an already established client. The breaker table must exist.
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    /// Connects with the given parameters, driving the connection on a
    /// background task.
    pub async fn connect(config: &PgConfig) -> Result<Self, StoreError> {
        let (client, connection) =
            tokio_postgres::connect(&config.connection_string(), NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(%error, "postgres breaker store connection terminated");
            }
        });
        Ok(Self::new(client))
    }

    /// Creates the breaker table and its indexes if they do not exist.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        client.batch_execute(SCHEMA_SQL).await?;
        Ok(())
    }
}

#[async_trait]
impl BreakerStore for PostgresStore {
    async fn load(
        &self,
        resource_key: &str,
        namespace: &str,
        window_capacity: usize,
    ) -> Result<BreakerRecord, StoreError> {
        let client = self.client.lock().await;
        client
            .execute(INSERT_DEFAULT_SQL, &[&resource_key, &namespace])
            .await?;
        let row = client
            .query_one(
                "SELECT state, history, version, open_until, updated_at \
                 FROM tw_circuit_breakers \
                 WHERE resource_key = $1 AND namespace = $2",
                &[&resource_key, &namespace],
            )
            .await?;

        let state = BreakerState::parse(row.get::<_, &str>(0))?;
        let history = OutcomeWindow::decode(row.get::<_, &str>(1), window_capacity);
        let version = row.get::<_, i64>(2) as u64;
        let open_until: Option<DateTime<Utc>> = row.get(3);
        let updated_at: DateTime<Utc> = row.get(4);

        Ok(BreakerRecord {
            state,
            history,
            open_until,
            version,
            updated_at,
        })
    }

    async fn compare_and_save(
        &self,
        resource_key: &str,
        namespace: &str,
        expected_version: u64,
        record: &BreakerRecord,
    ) -> Result<SaveOutcome, StoreError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        tx.execute(INSERT_DEFAULT_SQL, &[&resource_key, &namespace])
            .await?;
        let row = tx
            .query_one(
                "SELECT version FROM tw_circuit_breakers \
                 WHERE resource_key = $1 AND namespace = $2 \
                 FOR UPDATE",
                &[&resource_key, &namespace],
            )
            .await?;

        if row.get::<_, i64>(0) as u64 != expected_version {
            tx.rollback().await?;
            return Ok(SaveOutcome::Conflict);
        }

        let failure_count = record.history.failures() as i32;
        let next_version = (expected_version + 1) as i64;
        tx.execute(
            "UPDATE tw_circuit_breakers \
             SET state = $3, failure_count = $4, history = $5, version = $6, \
                 open_until = $7, updated_at = NOW() \
             WHERE resource_key = $1 AND namespace = $2",
            &[
                &resource_key,
                &namespace,
                &record.state.as_str(),
                &failure_count,
                &record.history.encode(),
                &next_version,
                &record.open_until,
            ],
        )
        .await?;
        tx.commit().await?;

        Ok(SaveOutcome::Committed)
    }
}
