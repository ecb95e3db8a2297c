//! Probe Scheduler (spec.md §4.7): per-host periodic ICMP timers.
//!
//! Each monitored host owns an `activeFlag` and a timer `Cancellation`
//! (spec.md §5 Shared-resource policy: "one mutex per scheduler"). A tick
//! checks the flag, runs one ICMP probe bounded at 5s, invokes the callback,
//! then reschedules itself — mirroring `Runtime::schedule_after`'s
//! one-shot-plus-reschedule shape rather than a bare `loop { sleep }`, so
//! `stopMonitoring` can cancel a specific pending timer instead of racing a
//! loop body.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::instrument;

use crate::probes::icmp;
use crate::runtime::{Cancellation, Runtime};
use crate::storage::models::{Host, PingResult};

type PingCallback = Arc<dyn Fn(PingResult) + Send + Sync>;

struct HostState {
    active: Arc<AtomicBool>,
    timer: Mutex<Cancellation>,
}

/// Maintains `hostId -> MonitoredHost` (spec.md §3 Ownership: the scheduler
/// exclusively owns this map).
pub struct ProbeScheduler {
    runtime: Runtime,
    hosts: Mutex<HashMap<i64, Arc<HostState>>>,
}

impl ProbeScheduler {
    pub fn new(runtime: Runtime) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    /// Cancels any existing entry for `host.id`, installs a new one, and
    /// schedules the first ping after `host.ping_interval_seconds`
    /// (spec.md §4.7).
    #[instrument(skip(self, host, callback), fields(host_id = host.id))]
    pub async fn start_monitoring<F>(self: &Arc<Self>, host: Host, callback: F)
    where
        F: Fn(PingResult) + Send + Sync + 'static,
    {
        let host_id = host.id;
        self.cancel_existing(host_id).await;

        let active = Arc::new(AtomicBool::new(true));
        let callback: PingCallback = Arc::new(callback);
        let interval = Duration::from_secs(host.ping_interval_seconds.max(1) as u64);

        let timer = self.runtime.schedule_after(
            interval,
            Self::tick(self.clone(), host, active.clone(), callback),
        );

        self.hosts.lock().await.insert(
            host_id,
            Arc::new(HostState {
                active,
                timer: Mutex::new(timer),
            }),
        );
    }

    async fn cancel_existing(&self, host_id: i64) {
        if let Some(state) = self.hosts.lock().await.remove(&host_id) {
            state.active.store(false, Ordering::SeqCst);
            state.timer.lock().await.cancel();
        }
    }

    /// One scheduler tick (spec.md §4.7 numbered steps): check the flag,
    /// probe, stamp+invoke the callback without waiting on it, then
    /// reschedule — unless the host was removed or stopped meanwhile.
    fn tick(
        scheduler: Arc<ProbeScheduler>,
        host: Host,
        active: Arc<AtomicBool>,
        callback: PingCallback,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if !active.load(Ordering::SeqCst) {
                return;
            }

            let mut result = icmp::ping_with_default_timeout(&host.address).await;
            result.host_id = host.id;
            callback(result);

            if !active.load(Ordering::SeqCst) {
                return;
            }

            let interval = Duration::from_secs(host.ping_interval_seconds.max(1) as u64);
            let next_timer = scheduler.runtime.schedule_after(
                interval,
                Self::tick(scheduler.clone(), host.clone(), active.clone(), callback.clone()),
            );

            let current_state = scheduler.hosts.lock().await.get(&host.id).cloned();
            match current_state {
                Some(state) => *state.timer.lock().await = next_timer,
                None => next_timer.cancel(),
            }
        })
    }

    /// Clears the flag and cancels the timer (spec.md §4.7).
    pub async fn stop_monitoring(&self, host_id: i64) {
        self.cancel_existing(host_id).await;
    }

    pub async fn stop_all(&self) {
        let mut hosts = self.hosts.lock().await;
        for (_, state) in hosts.drain() {
            state.active.store(false, Ordering::SeqCst);
            state.timer.lock().await.cancel();
        }
    }

    pub async fn is_monitoring(&self, host_id: i64) -> bool {
        self.hosts.lock().await.contains_key(&host_id)
    }
}
