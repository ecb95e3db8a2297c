//! Storage Engine and Repositories (spec.md §4.2, §4.3).
//!
//! `engine` wraps the single SQLite file; `migrations` holds the versioned
//! schema scripts; `models` holds the shared aggregate types every
//! repository and the HTTP layer depend on. Each remaining submodule is one
//! repository: typed CRUD over a single aggregate, mirroring the teacher's
//! one-actor-per-concern layout applied to storage instead.

pub mod engine;
pub mod host_groups;
pub mod hosts;
pub mod metrics;
pub mod migrations;
pub mod models;
pub mod scheduled_scans;
pub mod snmp_repo;

pub use engine::Storage;
pub use host_groups::HostGroupRepository;
pub use hosts::HostRepository;
pub use metrics::MetricsRepository;
pub use scheduled_scans::ScheduledScanRepository;
pub use snmp_repo::SnmpRepository;
