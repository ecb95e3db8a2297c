//! Storage Engine (spec.md §4.2)
//!
//! Wraps a single-file SQLite database via `sqlx`. On open: WAL journaling,
//! `synchronous=NORMAL`, `foreign_keys=ON`. Exposes `execute`, `fetch_*` row
//! access, and `transaction` (BEGIN/COMMIT with rollback on failure). A
//! process-wide async mutex serializes logical transactions the way the
//! teacher's actors serialize access to a single storage handle.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{NetPulseError, NetPulseResult};

use super::migrations::MIGRATIONS;

/// Shared handle to the database. Cloning is cheap (`Arc` internally); the
/// composition root owns one `Storage` and hands clones to every subsystem
/// for the duration of their lifetime (spec.md §9).
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    write_lock: Arc<Mutex<()>>,
}

impl Storage {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> NetPulseResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!("opening NetPulse database at {}", path_str);

        let options = SqliteConnectOptions::new()
            .filename(&path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| NetPulseError::Fatal(format!("cannot open database: {e}")))?;

        let storage = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// In-memory database, for tests.
    pub async fn open_in_memory() -> NetPulseResult<Self> {
        Self::open(":memory:").await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    #[instrument(skip(self))]
    async fn run_migrations(&self) -> NetPulseResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (\
                version INTEGER PRIMARY KEY, \
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP\
            )",
        )
        .execute(&self.pool)
        .await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        let current = current.unwrap_or(0);
        debug!("current schema version: {}", current);

        for migration in MIGRATIONS {
            if migration.version <= current {
                continue;
            }
            info!(
                "applying migration {}: {}",
                migration.version, migration.name
            );
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
                .bind(migration.version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        Ok(())
    }

    /// Runs `f` inside a BEGIN/COMMIT transaction; any `Err` rolls back.
    /// Held only briefly per spec.md §5's shared-resource policy.
    pub async fn transaction<F, T>(&self, f: F) -> NetPulseResult<T>
    where
        for<'c> F: FnOnce(
            &'c mut Transaction<'_, Sqlite>,
        )
            -> futures::future::BoxFuture<'c, NetPulseResult<T>>,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = f(&mut tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

/// Timestamp serialization helpers (spec.md §4.3 Time serialization).
pub mod time {
    use chrono::{DateTime, NaiveDateTime, Utc};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn to_sql(ts: &DateTime<Utc>) -> String {
        ts.format(FORMAT).to_string()
    }

    pub fn from_sql(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|_| Utc::now())
    }
}
