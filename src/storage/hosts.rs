//! HostRepository (spec.md §4.3).

use tracing::{debug, instrument};

use crate::error::{NetPulseError, NetPulseResult};

use super::engine::{Storage, time};
use super::models::{Host, HostStatus};

#[derive(Clone)]
pub struct HostRepository {
    storage: Storage,
}

impl HostRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Validates and inserts a host; `address` must be unique (spec.md §3).
    #[instrument(skip(self, host), fields(address = %host.address))]
    pub async fn insert(&self, host: &Host) -> NetPulseResult<i64> {
        host.validate().map_err(NetPulseError::validation)?;

        if self.find_by_address(&host.address).await?.is_some() {
            return Err(NetPulseError::validation(format!(
                "a host with address '{}' already exists",
                host.address
            )));
        }

        let result = sqlx::query(
            "INSERT INTO hosts (name, address, ping_interval_seconds, warning_threshold_ms, \
             critical_threshold_ms, status, enabled, group_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&host.name)
        .bind(&host.address)
        .bind(host.ping_interval_seconds)
        .bind(host.warning_threshold_ms)
        .bind(host.critical_threshold_ms)
        .bind(host.status.as_str())
        .bind(host.enabled)
        .bind(host.group_id)
        .bind(time::to_sql(&host.created_at))
        .execute(self.storage.pool())
        .await?;

        let id = result.last_insert_rowid();
        debug!(host_id = id, "inserted host");
        Ok(id)
    }

    #[instrument(skip(self, host), fields(host_id = host.id))]
    pub async fn update(&self, host: &Host) -> NetPulseResult<()> {
        host.validate().map_err(NetPulseError::validation)?;
        let result = sqlx::query(
            "UPDATE hosts SET name = ?, address = ?, ping_interval_seconds = ?, \
             warning_threshold_ms = ?, critical_threshold_ms = ?, enabled = ?, group_id = ? \
             WHERE id = ?",
        )
        .bind(&host.name)
        .bind(&host.address)
        .bind(host.ping_interval_seconds)
        .bind(host.warning_threshold_ms)
        .bind(host.critical_threshold_ms)
        .bind(host.enabled)
        .bind(host.group_id)
        .bind(host.id)
        .execute(self.storage.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(NetPulseError::not_found(format!(
                "host {} not found",
                host.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> NetPulseResult<()> {
        let result = sqlx::query("DELETE FROM hosts WHERE id = ?")
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(NetPulseError::not_found(format!("host {id} not found")));
        }
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> NetPulseResult<Option<Host>> {
        let row = sqlx::query_as::<_, HostRow>("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.storage.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_by_address(&self, address: &str) -> NetPulseResult<Option<Host>> {
        let row = sqlx::query_as::<_, HostRow>("SELECT * FROM hosts WHERE address = ?")
            .bind(address)
            .fetch_optional(self.storage.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_all(&self) -> NetPulseResult<Vec<Host>> {
        let rows = sqlx::query_as::<_, HostRow>("SELECT * FROM hosts ORDER BY name ASC")
            .fetch_all(self.storage.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_enabled(&self) -> NetPulseResult<Vec<Host>> {
        let rows = sqlx::query_as::<_, HostRow>(
            "SELECT * FROM hosts WHERE enabled = 1 ORDER BY name ASC",
        )
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// `group_id = None` returns ungrouped hosts (spec.md §4.3).
    pub async fn find_by_group_id(&self, group_id: Option<i64>) -> NetPulseResult<Vec<Host>> {
        let rows = match group_id {
            Some(gid) => {
                sqlx::query_as::<_, HostRow>(
                    "SELECT * FROM hosts WHERE group_id = ? ORDER BY name ASC",
                )
                .bind(gid)
                .fetch_all(self.storage.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, HostRow>(
                    "SELECT * FROM hosts WHERE group_id IS NULL ORDER BY name ASC",
                )
                .fetch_all(self.storage.pool())
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Owned exclusively by the Alert Engine (spec.md §3 Ownership).
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: i64, status: HostStatus) -> NetPulseResult<()> {
        sqlx::query("UPDATE hosts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        Ok(())
    }

    pub async fn update_last_checked(&self, id: i64) -> NetPulseResult<()> {
        sqlx::query("UPDATE hosts SET last_checked = ? WHERE id = ?")
            .bind(time::to_sql(&chrono::Utc::now()))
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        Ok(())
    }

    pub async fn set_host_group(&self, id: i64, group_id: Option<i64>) -> NetPulseResult<()> {
        sqlx::query("UPDATE hosts SET group_id = ? WHERE id = ?")
            .bind(group_id)
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> NetPulseResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hosts")
            .fetch_one(self.storage.pool())
            .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct HostRow {
    id: i64,
    name: String,
    address: String,
    ping_interval_seconds: i64,
    warning_threshold_ms: i64,
    critical_threshold_ms: i64,
    status: String,
    enabled: bool,
    group_id: Option<i64>,
    created_at: String,
    last_checked: Option<String>,
}

impl From<HostRow> for Host {
    fn from(row: HostRow) -> Self {
        Host {
            id: row.id,
            name: row.name,
            address: row.address,
            ping_interval_seconds: row.ping_interval_seconds,
            warning_threshold_ms: row.warning_threshold_ms,
            critical_threshold_ms: row.critical_threshold_ms,
            status: HostStatus::parse(&row.status),
            enabled: row.enabled,
            group_id: row.group_id,
            created_at: time::from_sql(&row.created_at),
            last_checked: row.last_checked.map(|s| time::from_sql(&s)),
        }
    }
}
