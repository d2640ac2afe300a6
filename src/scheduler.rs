//! Background sync scheduler: periodic reachability polling and drains.
//!
//! Spawns a thread that, on every probe tick, asks the reachability probe
//! and feeds the answer to the connectivity monitor (an offline→online edge
//! triggers the coordinator's drain through its callback). On every drain
//! tick, while online, it also drains explicitly so a queue left behind by
//! a failed pass is retried without waiting for the next reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connectivity::{ConnectivityMonitor, ReachabilityProbe};
use crate::coordinator::SubmissionCoordinator;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub probe_interval: Duration,
    pub drain_interval: Duration,
}

/// Handle for the background sync thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on `Drop`.
pub struct SyncSchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SyncSchedulerHandle {
    /// Request graceful shutdown. A drain in progress completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for SyncSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the background scheduler on a separate thread.
pub fn start_sync_scheduler(
    coordinator: Arc<SubmissionCoordinator>,
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<dyn ReachabilityProbe>,
    config: ScheduleConfig,
) -> SyncSchedulerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(
            probe_secs = config.probe_interval.as_secs(),
            drain_secs = config.drain_interval.as_secs(),
            "Background sync scheduler started"
        );
        scheduler_loop(&coordinator, &monitor, probe.as_ref(), config, &flag);
        tracing::info!("Background sync scheduler shutting down");
    });

    SyncSchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn scheduler_loop(
    coordinator: &SubmissionCoordinator,
    monitor: &ConnectivityMonitor,
    probe: &dyn ReachabilityProbe,
    config: ScheduleConfig,
    shutdown: &AtomicBool,
) {
    let mut next_probe = Instant::now() + config.probe_interval;
    let mut next_drain = Instant::now() + config.drain_interval;

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(SLEEP_GRANULARITY);
        let now = Instant::now();

        if now >= next_probe {
            monitor.poll(probe);
            next_probe = now + config.probe_interval;
        }

        if now >= next_drain {
            next_drain = now + config.drain_interval;
            if !monitor.is_online() {
                continue;
            }
            match coordinator.drain() {
                Ok(report) if report.attempted > 0 => {
                    tracing::debug!(
                        synced = report.synced,
                        remaining = report.remaining,
                        "Scheduled drain ran"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Scheduled drain failed"),
            }
        }
    }
}
