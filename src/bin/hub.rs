//! Composition root (spec.md §9): wires Storage, the Repositories, the three
//! probes, the two schedulers, the Alert Engine, the Notification
//! Dispatcher, Retention, and the HTTP/JSON API into one running process.
//! Storage is a value owned here and handed to every subsystem by clone for
//! the duration of its lifetime; the subsystems themselves never construct
//! their own database handle.

use std::sync::Arc;

use clap::Parser;
use netpulse::alert_engine::AlertEngine;
use netpulse::api::{ApiServer, ApiState};
use netpulse::config::{self, Config};
use netpulse::notifications::NotificationDispatcher;
use netpulse::probes::snmp::poller::SnmpPoller;
use netpulse::retention::Retention;
use netpulse::runtime::Runtime;
use netpulse::scan_engine::ScanEngine;
use netpulse::scheduler::ProbeScheduler;
use netpulse::secrets::{SecretStore, REST_API_KEY};
use netpulse::storage::{
    HostGroupRepository, HostRepository, MetricsRepository, ScheduledScanRepository, SnmpRepository, Storage,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "netpulse-hub", about = "Host-availability and network-reachability monitor")]
struct Args {
    /// Path to the JSON config file; defaults to the platform app-data directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Overrides the configured database path.
    #[arg(long)]
    database: Option<std::path::PathBuf>,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true).compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(config::default_config_path);

    let mut app_config = Config::load(&config_path).await.map_err(|e| {
        error!(error = %e, "fatal: cannot load configuration");
        e
    })?;
    if let Some(database) = args.database {
        app_config.database_path = database;
    }

    let secrets_path = config::default_secrets_path();
    let secrets = SecretStore::load(secrets_path).await?;
    let api_key = secrets.get(REST_API_KEY).await.unwrap_or_default();

    let storage = Storage::open(&app_config.database_path).await.map_err(|e| {
        error!(error = %e, "fatal: cannot open database");
        e
    })?;
    info!(path = %app_config.database_path.display(), "database ready");

    let hosts = HostRepository::new(storage.clone());
    let groups = HostGroupRepository::new(storage.clone());
    let metrics = MetricsRepository::new(storage.clone());
    let scans = ScheduledScanRepository::new(storage.clone());
    let snmp_repo = SnmpRepository::new(storage.clone());

    let runtime = Runtime::new();

    let alert_engine = Arc::new(AlertEngine::new(hosts.clone(), metrics.clone()));
    alert_engine.set_thresholds(app_config.alert_thresholds).await;

    let notifier = NotificationDispatcher::new(hosts.clone());
    notifier.set_enabled(app_config.webhook_enabled);
    {
        let notifier = notifier.clone();
        alert_engine.set_notifier(move |alert| notifier.dispatch(alert)).await;
    }

    let probe_scheduler = ProbeScheduler::new(runtime.clone());
    let scan_engine = ScanEngine::new(runtime.clone());
    let snmp_poller = Arc::new(SnmpPoller::new());

    start_ping_monitoring(&probe_scheduler, &hosts, &metrics, &alert_engine).await?;
    start_scan_schedules(&scan_engine, &scans, &metrics, &alert_engine).await?;
    start_snmp_monitoring(&snmp_poller, &snmp_repo, &hosts).await?;

    let retention = Retention::new(runtime.clone(), metrics.clone(), scans.clone(), snmp_repo.clone());
    retention.start(app_config.retention_days, app_config.auto_cleanup).await?;

    let api_server = if app_config.rest_api_enabled {
        let state = Arc::new(ApiState { hosts: hosts.clone(), groups: groups.clone(), metrics: metrics.clone() });
        let server = ApiServer::new(runtime.clone(), state, api_key);
        let bound_port = server.listen(app_config.rest_api_port).await?;
        info!(port = bound_port, "HTTP API ready");
        Some(server)
    } else {
        info!("HTTP API disabled by configuration");
        None
    };

    info!("NetPulse running; press Ctrl+C to shut down");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!("shutting down");
    if let Some(server) = &api_server {
        server.stop();
    }
    probe_scheduler.stop_all().await;
    scan_engine.stop().await;
    snmp_poller.stop_all_monitoring().await;
    retention.stop().await;
    runtime.stop();

    Ok(())
}

/// Starts the ICMP scheduler for every enabled host; each tick's callback
/// persists the result and hands it to the Alert Engine without blocking
/// the scheduler's own reschedule (spec.md §4.7 step 3-4).
async fn start_ping_monitoring(
    scheduler: &Arc<ProbeScheduler>,
    hosts: &HostRepository,
    metrics: &MetricsRepository,
    alert_engine: &Arc<AlertEngine>,
) -> anyhow::Result<()> {
    for host in hosts.find_enabled().await? {
        let metrics = metrics.clone();
        let alert_engine = alert_engine.clone();
        scheduler
            .start_monitoring(host, move |result| {
                let metrics = metrics.clone();
                let alert_engine = alert_engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = metrics.insert_ping_result(&result).await {
                        warn!(error = %e, host_id = result.host_id, "failed to persist ping result");
                        return;
                    }
                    if let Err(e) = alert_engine.process_ping_result(&result).await {
                        warn!(error = %e, host_id = result.host_id, "alert engine failed to process ping result");
                    }
                });
            })
            .await;
    }
    Ok(())
}

/// Installs timers for every enabled `ScheduledScanConfig`, persisting each
/// run's results and any non-empty diff (spec.md §4.8), and emitting a
/// `ScanComplete` alert for scans whose target matches a registered host
/// and whose schedule has `notifyOnChanges` set (spec.md §3 Alert type
/// `ScanComplete`).
async fn start_scan_schedules(
    scan_engine: &Arc<ScanEngine>,
    scans: &ScheduledScanRepository,
    metrics: &MetricsRepository,
    alert_engine: &Arc<AlertEngine>,
) -> anyhow::Result<()> {
    {
        let metrics = metrics.clone();
        let scans = scans.clone();
        let alert_engine = alert_engine.clone();
        scan_engine
            .set_scan_complete_callback(move |schedule_id, results| {
                let metrics = metrics.clone();
                let scans = scans.clone();
                let alert_engine = alert_engine.clone();
                tokio::spawn(async move {
                    for result in &results {
                        if let Err(e) = metrics.insert_port_scan_result(result).await {
                            warn!(error = %e, "failed to persist port scan result");
                        }
                    }

                    match scans.find_by_id(schedule_id).await {
                        Ok(Some(schedule)) if schedule.notify_on_changes => {
                            if let Err(e) = alert_engine
                                .emit_scan_complete(&schedule.target_address, &results)
                                .await
                            {
                                warn!(error = %e, schedule_id, "failed to emit scan-complete alert");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, schedule_id, "failed to load schedule for scan-complete alert"),
                    }
                });
            })
            .await;
    }
    {
        let scans = scans.clone();
        scan_engine
            .set_diff_callback(move |schedule_id, diff| {
                let scans = scans.clone();
                tokio::spawn(async move {
                    if let Err(e) = scans.insert_diff(schedule_id, &diff).await {
                        warn!(error = %e, schedule_id, "failed to persist port scan diff");
                    }
                });
            })
            .await;
    }

    let enabled = scans.find_enabled().await?;
    scan_engine.start(enabled).await;
    Ok(())
}

/// Starts one poller per enabled `SnmpDeviceConfig`, resolving the target
/// address from the owning host (spec.md §4.6 Monitoring: `startMonitoring`
/// is keyed on `host`, and `SnmpDeviceConfig` only carries `hostId`).
async fn start_snmp_monitoring(
    poller: &Arc<SnmpPoller>,
    snmp_repo: &SnmpRepository,
    hosts: &HostRepository,
) -> anyhow::Result<()> {
    for device in snmp_repo.find_enabled().await? {
        let Some(host) = hosts.find_by_id(device.host_id).await? else {
            warn!(host_id = device.host_id, "SNMP device config references a missing host, skipping");
            continue;
        };
        let snmp_repo = snmp_repo.clone();
        poller
            .start_monitoring(host.address, device, move |result| {
                let snmp_repo = snmp_repo.clone();
                tokio::spawn(async move {
                    if let Err(e) = snmp_repo.insert_result(&result).await {
                        warn!(error = %e, host_id = result.host_id, "failed to persist SNMP result");
                    }
                });
            })
            .await;
    }
    Ok(())
}
