//! I/O Runtime (spec.md §4.1).
//!
//! A thin wrapper over a `tokio::runtime::Runtime` plus a cancellable-timer
//! facility. Mirrors the shape of the teacher's actor handles: `post` is
//! `tokio::spawn`, `schedule_after` races `tokio::time::sleep` against a
//! child `CancellationToken` so a caller can cancel a pending timer without
//! blocking, and `accept_loop` spawns `per_conn_task` for every accepted
//! connection. Stopping the runtime cancels the root token, which every
//! timer and accept loop observes on its next poll.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Handle returned by `schedule_after`; dropping it does not cancel the
/// timer (call `cancel()` explicitly), matching the "cancellation by token"
/// contract from spec.md §4.1.
#[derive(Clone)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Process-wide runtime: worker pool (delegated to Tokio's own scheduler)
/// plus a root cancellation token every subsystem's timers derive from.
#[derive(Clone)]
pub struct Runtime {
    root: CancellationToken,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// Spawns `task` on a worker thread; no ordering is guaranteed relative
    /// to tasks from other producers (spec.md §4.1).
    pub fn post<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(task)
    }

    /// Runs `task` once after `duration`, unless cancelled first. Returns a
    /// `Cancellation` handle the caller can use to cancel before it fires.
    pub fn schedule_after<F>(&self, duration: std::time::Duration, task: F) -> Cancellation
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let child = self.root.child_token();
        let cancellation = Cancellation {
            token: child.clone(),
        };

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    task.await;
                }
                _ = child.cancelled() => {}
            }
        });

        cancellation
    }

    /// Accepts connections from `listener` in a loop, spawning
    /// `per_conn_task` for each. Stops when the runtime is stopped or the
    /// listener errors out.
    #[instrument(skip(self, listener, per_conn_task))]
    pub fn accept_loop<F, Fut>(&self, listener: TcpListener, per_conn_task: F) -> JoinHandle<()>
    where
        F: Fn(tokio::net::TcpStream, std::net::SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let root = self.root.clone();
        let per_conn_task = Arc::new(per_conn_task);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                let task = per_conn_task.clone();
                                tokio::spawn(async move { task(stream, addr).await });
                            }
                            Err(e) => {
                                warn!("accept() failed: {e}");
                            }
                        }
                    }
                    _ = root.cancelled() => {
                        debug!("accept loop stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Cancels every outstanding timer and accept loop derived from this
    /// runtime. Joining worker threads is delegated to the owning
    /// `tokio::main` runtime's own shutdown.
    pub fn stop(&self) {
        self.root.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker count default: `max(4, cpu_count)` (spec.md §4.1).
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(4)
}
