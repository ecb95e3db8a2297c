//! Migration scripts (spec.md §4.2 Migrations).
//!
//! Each migration is a fixed SQL script applied exactly once, in ascending
//! `version` order, inside its own transaction. New migrations are additive
//! only. Mirrors `Database::runMigrations` from the original C++
//! implementation, translated to Rust/sqlx with the version ledger kept in
//! `schema_migrations` instead of sqlx's built-in migrator table so the
//! on-disk contract matches spec.md exactly.

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial schema: hosts, ping_results, alerts, port_scan_results",
        statements: &[
            "CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                address TEXT NOT NULL UNIQUE,
                ping_interval_seconds INTEGER NOT NULL DEFAULT 30,
                warning_threshold_ms INTEGER NOT NULL DEFAULT 100,
                critical_threshold_ms INTEGER NOT NULL DEFAULT 500,
                status TEXT NOT NULL DEFAULT 'Unknown',
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_checked TEXT
            )",
            "CREATE TABLE IF NOT EXISTS ping_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                latency_us INTEGER NOT NULL DEFAULT 0,
                success INTEGER NOT NULL,
                ttl INTEGER,
                error_message TEXT NOT NULL DEFAULT ''
            )",
            "CREATE INDEX IF NOT EXISTS idx_ping_results_host_id ON ping_results(host_id)",
            "CREATE INDEX IF NOT EXISTS idx_ping_results_timestamp ON ping_results(timestamp)",
            "CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                acknowledged INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp)",
            "CREATE TABLE IF NOT EXISTS port_scan_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_address TEXT NOT NULL,
                port INTEGER NOT NULL,
                state TEXT NOT NULL,
                service_name TEXT NOT NULL DEFAULT '',
                scan_timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE INDEX IF NOT EXISTS idx_port_scan_address ON port_scan_results(target_address)",
        ],
    },
    Migration {
        version: 2,
        name: "host groups",
        statements: &[
            "CREATE TABLE IF NOT EXISTS host_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parent_id INTEGER REFERENCES host_groups(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE INDEX IF NOT EXISTS idx_host_groups_parent ON host_groups(parent_id)",
            "ALTER TABLE hosts ADD COLUMN group_id INTEGER REFERENCES host_groups(id) ON DELETE SET NULL",
        ],
    },
    Migration {
        version: 3,
        name: "scheduled scans and port scan diffs",
        statements: &[
            "CREATE TABLE IF NOT EXISTS scheduled_scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                target_address TEXT NOT NULL,
                port_range TEXT NOT NULL DEFAULT 'Common',
                custom_ports TEXT NOT NULL DEFAULT '',
                interval_minutes INTEGER NOT NULL DEFAULT 60,
                enabled INTEGER NOT NULL DEFAULT 1,
                notify_on_changes INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_run_at TEXT,
                next_run_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS port_scan_diffs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule_id INTEGER NOT NULL REFERENCES scheduled_scans(id) ON DELETE CASCADE,
                target_address TEXT NOT NULL,
                previous_scan_time TEXT NOT NULL,
                current_scan_time TEXT NOT NULL,
                changes_json TEXT NOT NULL,
                total_ports_scanned INTEGER NOT NULL,
                open_ports_before INTEGER NOT NULL,
                open_ports_after INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_port_scan_diffs_schedule ON port_scan_diffs(schedule_id)",
            "CREATE INDEX IF NOT EXISTS idx_port_scan_diffs_target ON port_scan_diffs(target_address)",
        ],
    },
    Migration {
        version: 4,
        name: "SNMP device configs, results, and OID values",
        statements: &[
            "CREATE TABLE IF NOT EXISTS snmp_device_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL UNIQUE REFERENCES hosts(id) ON DELETE CASCADE,
                version TEXT NOT NULL DEFAULT 'V2c',
                credentials TEXT NOT NULL,
                port INTEGER NOT NULL DEFAULT 161,
                timeout_ms INTEGER NOT NULL DEFAULT 5000,
                retries INTEGER NOT NULL DEFAULT 1,
                poll_interval_seconds INTEGER NOT NULL DEFAULT 60,
                oids TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_polled TEXT
            )",
            "CREATE TABLE IF NOT EXISTS snmp_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                version TEXT NOT NULL,
                response_time_us INTEGER NOT NULL DEFAULT 0,
                success INTEGER NOT NULL,
                error_message TEXT NOT NULL DEFAULT '',
                error_status INTEGER NOT NULL DEFAULT 0,
                error_index INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS snmp_oid_values (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                result_id INTEGER NOT NULL REFERENCES snmp_results(id) ON DELETE CASCADE,
                oid TEXT NOT NULL,
                data_type TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '',
                int_value INTEGER,
                counter_value INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_snmp_results_host_time ON snmp_results(host_id, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_snmp_oid_values_result ON snmp_oid_values(result_id)",
            "CREATE INDEX IF NOT EXISTS idx_snmp_device_configs_host ON snmp_device_configs(host_id)",
        ],
    },
];
