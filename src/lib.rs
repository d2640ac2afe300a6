pub mod config;
pub mod models;
pub mod db;
pub mod locations;
pub mod queue; // Durable local queue
pub mod remote; // Remote report store + in-process fake
pub mod connectivity;
pub mod aggregate; // Per-location disease totals
pub mod history; // Recent submissions of the acting hospital
pub mod core_state;
pub mod coordinator; // Submit / drain state machine
pub mod scheduler; // Background probe + periodic drain

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::aggregate::AggregateView;
use crate::config::{ConfigError, SyncConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::coordinator::SubmissionCoordinator;
use crate::core_state::CoreState;
use crate::history::HospitalHistory;
use crate::queue::{QueueError, SqliteReportQueue};
use crate::remote::{RemoteError, SupabaseReportStore};
use crate::scheduler::{ScheduleConfig, SyncSchedulerHandle};

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot open pending report queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Cannot create report store client: {0}")]
    Remote(#[from] RemoteError),
}

/// Running pipeline. Dropping it stops the background scheduler.
pub struct SyncRuntime {
    pub coordinator: Arc<SubmissionCoordinator>,
    pub connectivity: Arc<ConnectivityMonitor>,
    scheduler: SyncSchedulerHandle,
}

impl SyncRuntime {
    pub fn state(&self) -> &Arc<CoreState> {
        self.coordinator.state()
    }

    pub fn shutdown(self) {
        self.scheduler.shutdown();
    }
}

/// Load `SyncConfig` from `AROGYA_*` environment variables and start.
pub fn start_from_env() -> Result<SyncRuntime, StartupError> {
    start_with_lookup(|key| std::env::var(key).ok())
}

fn start_with_lookup<F>(lookup: F) -> Result<SyncRuntime, StartupError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = SyncConfig::from_lookup(lookup)?;
    start(&config)
}

/// Wire queue, remote store, connectivity and views from `config`, load
/// the initial dashboard figures, flush anything queued by an earlier run,
/// and start the background scheduler.
pub fn start(config: &SyncConfig) -> Result<SyncRuntime, StartupError> {
    tracing::info!("{} sync starting v{}", config::APP_NAME, config::APP_VERSION);

    let queue = Arc::new(SqliteReportQueue::open(&config.queue_db)?);
    let remote = Arc::new(SupabaseReportStore::from_config(config)?);
    let connectivity = Arc::new(ConnectivityMonitor::from_probe(remote.as_ref()));

    let state = Arc::new(CoreState::new(
        AggregateView::new(locations::known_location_ids(), config.outbreak_threshold),
        HospitalHistory::new(config.history_limit),
    ));

    let coordinator =
        SubmissionCoordinator::new(queue, remote.clone(), connectivity.clone(), state);
    coordinator.attach();

    coordinator.refresh_views();
    if connectivity.is_online() {
        match coordinator.drain() {
            Ok(report) if report.attempted > 0 => {
                tracing::info!(
                    synced = report.synced,
                    remaining = report.remaining,
                    "Startup sync"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Startup sync failed"),
        }
    } else {
        tracing::info!("Starting offline; reports will be queued");
    }

    let scheduler = scheduler::start_sync_scheduler(
        coordinator.clone(),
        connectivity.clone(),
        remote,
        ScheduleConfig {
            probe_interval: Duration::from_secs(config.probe_interval_secs),
            drain_interval: Duration::from_secs(config.drain_interval_secs),
        },
    );

    Ok(SyncRuntime {
        coordinator,
        connectivity,
        scheduler,
    })
}
