//! SnmpRepository (spec.md §3, §4.6): CRUD over `SnmpDeviceConfig` plus
//! persistence of `SnmpResult`/`SnmpVarBind`s across the two-table
//! `snmp_results`/`snmp_oid_values` split (migrations.rs v4).

use tracing::instrument;

use crate::error::{NetPulseError, NetPulseResult};

use super::engine::{Storage, time};
use super::models::{SnmpDataType, SnmpDeviceConfig, SnmpResult, SnmpVarBind, SnmpVersion};

#[derive(Clone)]
pub struct SnmpRepository {
    storage: Storage,
}

impl SnmpRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, config), fields(host_id = config.host_id))]
    pub async fn insert_device(&self, config: &SnmpDeviceConfig) -> NetPulseResult<i64> {
        let credentials_json = serde_json::to_string(&config.credentials)?;
        let oids_json = serde_json::to_string(&config.oids)?;
        let result = sqlx::query(
            "INSERT INTO snmp_device_configs \
             (host_id, version, credentials, port, timeout_ms, retries, poll_interval_seconds, \
              oids, enabled, created_at, last_polled) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(config.host_id)
        .bind(config.version.as_str())
        .bind(credentials_json)
        .bind(config.port as i64)
        .bind(config.timeout_ms)
        .bind(config.retries)
        .bind(config.poll_interval_seconds)
        .bind(oids_json)
        .bind(config.enabled)
        .bind(time::to_sql(&config.created_at))
        .bind(config.last_polled.map(|t| time::to_sql(&t)))
        .execute(self.storage.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_device(&self, config: &SnmpDeviceConfig) -> NetPulseResult<()> {
        let credentials_json = serde_json::to_string(&config.credentials)?;
        let oids_json = serde_json::to_string(&config.oids)?;
        sqlx::query(
            "UPDATE snmp_device_configs SET version = ?, credentials = ?, port = ?, \
             timeout_ms = ?, retries = ?, poll_interval_seconds = ?, oids = ?, enabled = ?, \
             last_polled = ? WHERE id = ?",
        )
        .bind(config.version.as_str())
        .bind(credentials_json)
        .bind(config.port as i64)
        .bind(config.timeout_ms)
        .bind(config.retries)
        .bind(config.poll_interval_seconds)
        .bind(oids_json)
        .bind(config.enabled)
        .bind(config.last_polled.map(|t| time::to_sql(&t)))
        .bind(config.id)
        .execute(self.storage.pool())
        .await?;
        Ok(())
    }

    pub async fn find_by_host_id(&self, host_id: i64) -> NetPulseResult<Option<SnmpDeviceConfig>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT * FROM snmp_device_configs WHERE host_id = ?",
        )
        .bind(host_id)
        .fetch_optional(self.storage.pool())
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn find_enabled(&self) -> NetPulseResult<Vec<SnmpDeviceConfig>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT * FROM snmp_device_configs WHERE enabled = 1",
        )
        .fetch_all(self.storage.pool())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn remove_device(&self, id: i64) -> NetPulseResult<()> {
        sqlx::query("DELETE FROM snmp_device_configs WHERE id = ?")
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self, result), fields(host_id = result.host_id, success = result.success))]
    pub async fn insert_result(&self, result: &SnmpResult) -> NetPulseResult<i64> {
        self.storage
            .transaction(|tx| {
                Box::pin(async move {
                    let row = sqlx::query(
                        "INSERT INTO snmp_results \
                         (host_id, timestamp, version, response_time_us, success, error_message, \
                          error_status, error_index) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(result.host_id)
                    .bind(time::to_sql(&result.timestamp))
                    .bind(result.version.as_str())
                    .bind(result.response_time_us)
                    .bind(result.success)
                    .bind(&result.error_message)
                    .bind(result.error_status)
                    .bind(result.error_index)
                    .execute(&mut **tx)
                    .await?;
                    let result_id = row.last_insert_rowid();

                    for vb in &result.varbinds {
                        sqlx::query(
                            "INSERT INTO snmp_oid_values \
                             (result_id, oid, data_type, value, int_value, counter_value) \
                             VALUES (?, ?, ?, ?, ?, ?)",
                        )
                        .bind(result_id)
                        .bind(&vb.oid)
                        .bind(vb.data_type.as_str())
                        .bind(&vb.value)
                        .bind(vb.int_value)
                        .bind(vb.counter_value.map(|v| v as i64))
                        .execute(&mut **tx)
                        .await?;
                    }

                    Ok(result_id)
                })
            })
            .await
    }

    pub async fn get_results(&self, host_id: i64, limit: i64) -> NetPulseResult<Vec<SnmpResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            "SELECT * FROM snmp_results WHERE host_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(host_id)
        .bind(limit)
        .fetch_all(self.storage.pool())
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let varbinds = self.get_varbinds(row.id).await?;
            results.push(row.into_result(varbinds));
        }
        Ok(results)
    }

    async fn get_varbinds(&self, result_id: i64) -> NetPulseResult<Vec<SnmpVarBind>> {
        let rows = sqlx::query_as::<_, VarBindRow>(
            "SELECT * FROM snmp_oid_values WHERE result_id = ? ORDER BY id ASC",
        )
        .bind(result_id)
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Cascades to `snmp_oid_values` via the schema's `ON DELETE CASCADE`.
    pub async fn cleanup_results_older_than(&self, max_age: chrono::Duration) -> NetPulseResult<u64> {
        let cutoff = chrono::Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM snmp_results WHERE timestamp < ?")
            .bind(time::to_sql(&cutoff))
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: i64,
    host_id: i64,
    version: String,
    credentials: String,
    port: i64,
    timeout_ms: i64,
    retries: i64,
    poll_interval_seconds: i64,
    oids: String,
    enabled: bool,
    created_at: String,
    last_polled: Option<String>,
}

impl TryFrom<DeviceRow> for SnmpDeviceConfig {
    type Error = NetPulseError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(SnmpDeviceConfig {
            id: row.id,
            host_id: row.host_id,
            version: SnmpVersion::parse(&row.version),
            credentials: serde_json::from_str(&row.credentials)?,
            port: row.port as u16,
            timeout_ms: row.timeout_ms,
            retries: row.retries as i32,
            poll_interval_seconds: row.poll_interval_seconds,
            oids: serde_json::from_str(&row.oids)?,
            enabled: row.enabled,
            created_at: time::from_sql(&row.created_at),
            last_polled: row.last_polled.map(|s| time::from_sql(&s)),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: i64,
    host_id: i64,
    timestamp: String,
    version: String,
    response_time_us: i64,
    success: bool,
    error_message: String,
    error_status: i64,
    error_index: i64,
}

impl ResultRow {
    fn into_result(self, varbinds: Vec<SnmpVarBind>) -> SnmpResult {
        SnmpResult {
            id: self.id,
            host_id: self.host_id,
            timestamp: time::from_sql(&self.timestamp),
            version: SnmpVersion::parse(&self.version),
            varbinds,
            response_time_us: self.response_time_us,
            success: self.success,
            error_message: self.error_message,
            error_status: self.error_status as i32,
            error_index: self.error_index as i32,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VarBindRow {
    oid: String,
    data_type: String,
    value: String,
    int_value: Option<i64>,
    counter_value: Option<i64>,
}

impl From<VarBindRow> for SnmpVarBind {
    fn from(row: VarBindRow) -> Self {
        SnmpVarBind {
            oid: row.oid,
            data_type: parse_data_type(&row.data_type),
            value: row.value,
            int_value: row.int_value,
            counter_value: row.counter_value.map(|v| v as u64),
        }
    }
}

fn parse_data_type(s: &str) -> SnmpDataType {
    match s {
        "Integer" => SnmpDataType::Integer,
        "OctetString" => SnmpDataType::OctetString,
        "ObjectIdentifier" => SnmpDataType::ObjectIdentifier,
        "IpAddress" => SnmpDataType::IpAddress,
        "Counter32" => SnmpDataType::Counter32,
        "Gauge32" => SnmpDataType::Gauge32,
        "TimeTicks" => SnmpDataType::TimeTicks,
        "Counter64" => SnmpDataType::Counter64,
        "Null" => SnmpDataType::Null,
        "NoSuchObject" => SnmpDataType::NoSuchObject,
        "NoSuchInstance" => SnmpDataType::NoSuchInstance,
        "EndOfMibView" => SnmpDataType::EndOfMibView,
        _ => SnmpDataType::Unknown,
    }
}
