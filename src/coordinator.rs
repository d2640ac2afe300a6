//! Submission coordinator: how a bulk report reaches the remote store.
//!
//! Per report: Submitted → DirectWriteAttempted → Confirmed | Queued, and
//! for queued reports: DrainAttempted → Confirmed | StillQueued.
//!
//! Remote failures are absorbed where a fallback exists (submit falls back
//! to the local queue, drain leaves records queued). Only local storage
//! failures and invalid input reach the caller.
//!
//! Delivery is at-least-once. A queued record is deleted only after the
//! remote store accepted it; if the process dies between the two, the
//! record is replayed on the next drain. The record's client reference
//! lets an idempotent store absorb that replay.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDate, Utc};
use thiserror::Error;

use crate::connectivity::ConnectivityMonitor;
use crate::core_state::CoreState;
use crate::models::{PendingBulkReport, ReportForm, ValidationError};
use crate::queue::{QueueError, ReportQueue};
use crate::remote::{RemoteError, ReportStore};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid report: {0}")]
    Validation(#[from] ValidationError),

    #[error("Could not save report locally: {0}")]
    LocalStorage(#[from] QueueError),
}

#[derive(Error, Debug)]
pub enum DrainError {
    #[error("Local queue failure during sync: {0}")]
    LocalStorage(#[from] QueueError),
}

/// Why a report went to the local queue instead of the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueReason {
    Offline,
    RemoteFailed(RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted by the remote store.
    Submitted,
    /// Saved on this device; will sync when online.
    Queued { local_id: i64, reason: QueueReason },
}

/// The record a drain pass stopped on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainHalt {
    pub local_id: i64,
    pub error: RemoteError,
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    pub remaining: usize,
    pub halted: Option<DrainHalt>,
}

pub struct SubmissionCoordinator {
    queue: Arc<dyn ReportQueue>,
    remote: Arc<dyn ReportStore>,
    connectivity: Arc<ConnectivityMonitor>,
    state: Arc<CoreState>,
    /// Serialises submit and drain so queue order matches call order.
    op_lock: Mutex<()>,
}

impl SubmissionCoordinator {
    pub fn new(
        queue: Arc<dyn ReportQueue>,
        remote: Arc<dyn ReportStore>,
        connectivity: Arc<ConnectivityMonitor>,
        state: Arc<CoreState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            remote,
            connectivity,
            state,
            op_lock: Mutex::new(()),
        })
    }

    /// Drain on every offline→online edge of the connectivity monitor.
    pub fn attach(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.connectivity.on_online(move || {
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            if let Err(e) = coordinator.drain() {
                tracing::error!(error = %e, "Reconnect sync failed");
            }
        });
    }

    pub fn state(&self) -> &Arc<CoreState> {
        &self.state
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Reports still waiting on this device.
    pub fn pending_count(&self) -> Result<u32, QueueError> {
        self.queue.len()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a report from the form.
    ///
    /// Validates before any I/O. Online: writes straight to the remote
    /// store, falling back to the local queue on any remote error.
    /// Offline: queues without touching the network.
    pub fn submit(&self, form: &ReportForm) -> Result<SubmitOutcome, SubmitError> {
        let report = form.validate(today())?;
        let _guard = self.lock();

        let pending = PendingBulkReport::new(report, Utc::now());

        if !self.connectivity.is_online() {
            let local_id = self.queue.enqueue(&pending)?;
            tracing::info!(local_id, "Offline: report saved, will sync when online");
            return Ok(SubmitOutcome::Queued {
                local_id,
                reason: QueueReason::Offline,
            });
        }

        match self.remote.insert(&pending.to_insert()) {
            Ok(()) => {
                tracing::info!(
                    location_id = %pending.location_id,
                    disease = %pending.disease,
                    cases = pending.case_count,
                    "Report submitted"
                );
                self.refresh_views();
                Ok(SubmitOutcome::Submitted)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to submit report, queuing offline");
                let local_id = self.queue.enqueue(&pending)?;
                Ok(SubmitOutcome::Queued {
                    local_id,
                    reason: QueueReason::RemoteFailed(e),
                })
            }
        }
    }

    /// Replay queued reports oldest first.
    ///
    /// Each record is removed only after the remote store accepts it. The
    /// pass stops at the first remote failure and leaves that record and
    /// everything after it queued. Views refresh once per pass, and only
    /// if the remote store accepted something.
    pub fn drain(&self) -> Result<DrainReport, DrainError> {
        let _guard = self.lock();

        let pending = self.queue.list_all()?;
        if pending.is_empty() {
            return Ok(DrainReport::default());
        }

        tracing::info!(count = pending.len(), "Syncing offline reports");

        let mut report = DrainReport {
            remaining: pending.len(),
            ..DrainReport::default()
        };

        for record in &pending {
            let Some(local_id) = record.local_id else {
                continue;
            };
            report.attempted += 1;

            if let Err(e) = self.remote.insert(&record.to_insert()) {
                tracing::warn!(
                    local_id,
                    transient = e.is_transient(),
                    error = %e,
                    "Failed to sync report, leaving remaining reports queued"
                );
                report.halted = Some(DrainHalt { local_id, error: e });
                break;
            }

            if let Err(e) = self.queue.remove(local_id) {
                tracing::error!(
                    local_id,
                    client_ref = %record.client_ref,
                    error = %e,
                    "Report accepted remotely but not removed locally; it will be replayed"
                );
                // The remote insert landed, so confirmed contents changed.
                self.refresh_views();
                return Err(e.into());
            }

            report.synced += 1;
            report.remaining -= 1;
        }

        if report.synced > 0 {
            self.refresh_views();
        }

        tracing::info!(
            synced = report.synced,
            remaining = report.remaining,
            "Offline sync pass complete"
        );
        Ok(report)
    }

    /// Sign a hospital in: load dashboard figures and its history, then
    /// push anything left queued from an earlier session.
    pub fn start_session(&self, hospital_id: &str) -> Result<DrainReport, DrainError> {
        self.state.set_active_hospital(Some(hospital_id.to_string()));
        self.refresh_views();
        if self.connectivity.is_online() {
            self.drain()
        } else {
            Ok(DrainReport::default())
        }
    }

    /// Sign out: forget the hospital and its cached history.
    pub fn end_session(&self) {
        self.state.set_active_hospital(None);
        self.state.history().clear();
    }

    /// Recompute aggregates and refresh the active hospital's history.
    /// Failures are logged by the views and otherwise ignored.
    pub fn refresh_views(&self) {
        let _ = self.state.aggregates().recompute(self.remote.as_ref());
        if let Some(hospital_id) = self.state.active_hospital() {
            let _ = self.state.history().refresh(self.remote.as_ref(), &hospital_id);
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateView;
    use crate::history::HospitalHistory;
    use crate::models::Disease;
    use crate::queue::SqliteReportQueue;
    use crate::remote::InMemoryReportStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        coordinator: Arc<SubmissionCoordinator>,
        queue: Arc<SqliteReportQueue>,
        remote: Arc<InMemoryReportStore>,
        monitor: Arc<ConnectivityMonitor>,
    }

    fn harness(online: bool) -> Harness {
        let queue = Arc::new(SqliteReportQueue::open_in_memory().unwrap());
        let remote = Arc::new(InMemoryReportStore::new());
        let monitor = Arc::new(ConnectivityMonitor::new(online));
        let state = Arc::new(CoreState::new(
            AggregateView::new(vec!["L1".into()], 150),
            HospitalHistory::new(5),
        ));
        let coordinator =
            SubmissionCoordinator::new(queue.clone(), remote.clone(), monitor.clone(), state);
        coordinator.attach();
        Harness {
            coordinator,
            queue,
            remote,
            monitor,
        }
    }

    fn form(disease: &str, count: i64) -> ReportForm {
        ReportForm {
            hospital_id: "H1".into(),
            location_id: "L1".into(),
            disease: disease.into(),
            case_count: count,
            report_date: today() - Duration::days(1),
        }
    }

    fn cholera_at_l1(h: &Harness) -> u64 {
        h.coordinator.state().aggregates().location("L1").unwrap()[&Disease::Cholera]
    }

    #[test]
    fn online_submit_confirms_and_recomputes() {
        let h = harness(true);
        let outcome = h.coordinator.submit(&form("Cholera", 5)).unwrap();

        assert_eq!(outcome, SubmitOutcome::Submitted);
        assert_eq!(h.remote.rows().len(), 1);
        assert!(h.queue.is_empty().unwrap());
        assert_eq!(cholera_at_l1(&h), 5);
    }

    #[test]
    fn online_submit_refreshes_active_hospital_history() {
        let h = harness(true);
        h.coordinator.start_session("H1").unwrap();
        assert!(h.coordinator.state().history().recent().is_empty());

        h.coordinator.submit(&form("Cholera", 5)).unwrap();

        let recent = h.coordinator.state().history().recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].disease, Disease::Cholera);
        assert_eq!(recent[0].case_count, 5);
    }

    #[test]
    fn online_remote_failure_falls_back_to_queue() {
        let h = harness(true);
        h.remote.script_inserts(&[true]);

        let outcome = h.coordinator.submit(&form("Typhoid", 3)).unwrap();

        assert!(matches!(
            outcome,
            SubmitOutcome::Queued { reason: QueueReason::RemoteFailed(_), .. }
        ));
        assert!(h.remote.rows().is_empty());
        assert_eq!(h.queue.len().unwrap(), 1);
        // No confirmed write, so no recompute.
        assert_eq!(h.remote.query_calls(), 0);
    }

    #[test]
    fn offline_submit_queues_without_remote_io() {
        let h = harness(false);
        let outcome = h.coordinator.submit(&form("Cholera", 2)).unwrap();

        assert!(matches!(
            outcome,
            SubmitOutcome::Queued { reason: QueueReason::Offline, .. }
        ));
        assert_eq!(h.remote.insert_calls(), 0);
        assert_eq!(h.coordinator.pending_count().unwrap(), 1);
    }

    #[test]
    fn invalid_input_rejected_before_any_io() {
        for online in [true, false] {
            let h = harness(online);
            let mut future = form("Cholera", 5);
            future.report_date = today() + Duration::days(1);

            for bad in [form("Cholera", 0), form("Cholera", -4), form("Malaria", 5), future] {
                let err = h.coordinator.submit(&bad).unwrap_err();
                assert!(matches!(err, SubmitError::Validation(_)));
            }

            assert!(h.queue.is_empty().unwrap());
            assert_eq!(h.remote.insert_calls(), 0);
            assert_eq!(h.remote.query_calls(), 0);
        }
    }

    #[test]
    fn reconnect_drains_in_fifo_order() {
        let h = harness(false);
        for count in 1..=6 {
            h.coordinator.submit(&form("Dysentery", count)).unwrap();
        }

        assert_eq!(h.monitor.set_online(true), Some(crate::connectivity::Transition::WentOnline));

        let counts: Vec<u32> = h.remote.rows().iter().map(|r| r.case_count).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
        assert!(h.queue.is_empty().unwrap());
    }

    #[test]
    fn drain_halts_on_first_failure_and_keeps_order() {
        let h = harness(false);
        h.coordinator.submit(&form("Cholera", 1)).unwrap(); // A
        h.coordinator.submit(&form("Cholera", 2)).unwrap(); // B
        h.coordinator.submit(&form("Cholera", 3)).unwrap(); // C
        let queued = h.queue.list_all().unwrap();
        let (a, b, c) = (queued[0].local_id, queued[1].local_id, queued[2].local_id);

        h.remote.script_inserts(&[false, true]);
        let report = h.coordinator.drain().unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.synced, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(report.halted.as_ref().map(|h| Some(h.local_id)), Some(b));

        let left: Vec<Option<i64>> =
            h.queue.list_all().unwrap().iter().map(|r| r.local_id).collect();
        assert_eq!(left, vec![b, c]);
        assert!(!left.contains(&a));
        assert_eq!(h.remote.rows().len(), 1);
        assert_eq!(cholera_at_l1(&h), 1);

        // Next pass picks up where the last one stopped.
        let report = h.coordinator.drain().unwrap();
        assert_eq!(report.synced, 2);
        assert!(report.halted.is_none());
        let counts: Vec<u32> = h.remote.rows().iter().map(|r| r.case_count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(cholera_at_l1(&h), 6);
    }

    #[test]
    fn empty_drain_does_no_remote_io() {
        let h = harness(true);
        let report = h.coordinator.drain().unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(h.remote.insert_calls(), 0);
        assert_eq!(h.remote.query_calls(), 0);
    }

    #[test]
    fn drain_refreshes_views_once_per_pass() {
        let h = harness(false);
        for count in 1..=3 {
            h.coordinator.submit(&form("Cholera", count)).unwrap();
        }
        h.coordinator.drain().unwrap();
        // One full scan for aggregates; no active hospital, so no history query.
        assert_eq!(h.remote.query_calls(), 1);
    }

    #[test]
    fn failing_drain_with_nothing_synced_skips_refresh() {
        let h = harness(false);
        h.coordinator.submit(&form("Cholera", 1)).unwrap();
        h.remote.set_outage(true);

        let report = h.coordinator.drain().unwrap();
        assert_eq!(report.synced, 0);
        assert_eq!(report.remaining, 1);
        assert_eq!(h.remote.query_calls(), 0);
    }

    #[test]
    fn report_is_never_lost_across_outage() {
        let h = harness(true);
        h.remote.set_outage(true);
        h.coordinator.submit(&form("Shigellosis", 9)).unwrap();
        assert_eq!(h.coordinator.drain().unwrap().synced, 0);
        assert_eq!(h.queue.len().unwrap(), 1);

        h.remote.set_outage(false);
        assert_eq!(h.coordinator.drain().unwrap().synced, 1);
        assert!(h.queue.is_empty().unwrap());
        assert_eq!(h.remote.rows()[0].case_count, 9);
    }

    #[test]
    fn replay_after_crash_is_absorbed_by_client_ref() {
        let h = harness(false);
        h.coordinator.submit(&form("Cholera", 4)).unwrap();
        // Remote insert landed but the local delete never happened.
        let stored = h.queue.list_all().unwrap().remove(0);
        h.remote.insert(&stored.to_insert()).unwrap();

        h.coordinator.drain().unwrap();
        assert_eq!(h.remote.rows().len(), 1);
        assert!(h.queue.is_empty().unwrap());
    }

    #[test]
    fn queued_reports_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.db");
        let remote = Arc::new(InMemoryReportStore::new());

        {
            let queue = Arc::new(SqliteReportQueue::open(&path).unwrap());
            let coordinator = SubmissionCoordinator::new(
                queue,
                remote.clone(),
                Arc::new(ConnectivityMonitor::new(false)),
                Arc::new(CoreState::default()),
            );
            coordinator.submit(&form("Cholera", 5)).unwrap();
        }

        let queue = Arc::new(SqliteReportQueue::open(&path).unwrap());
        let coordinator = SubmissionCoordinator::new(
            queue.clone(),
            remote.clone(),
            Arc::new(ConnectivityMonitor::new(true)),
            Arc::new(CoreState::default()),
        );
        let report = coordinator.start_session("H1").unwrap();

        assert_eq!(report.synced, 1);
        assert!(queue.is_empty().unwrap());
        assert_eq!(remote.rows().len(), 1);
        assert_eq!(coordinator.state().history().recent().len(), 1);
    }

    #[test]
    fn offline_then_online_scenario() {
        let h = harness(false);
        h.coordinator.state().aggregates().recompute(h.remote.as_ref()).unwrap();
        let before = cholera_at_l1(&h);

        let mut f = form("Cholera", 5);
        f.report_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        h.coordinator.submit(&f).unwrap();
        assert_eq!(h.queue.len().unwrap(), 1);

        h.monitor.set_online(true);

        assert!(h.queue.is_empty().unwrap());
        let rows = h.remote.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].disease, Disease::Cholera);
        assert_eq!(rows[0].case_count, 5);
        assert_eq!(cholera_at_l1(&h), before + 5);
    }

    #[test]
    fn session_start_loads_history_and_session_end_clears_it() {
        let h = harness(true);
        h.coordinator.submit(&form("Cholera", 5)).unwrap();
        h.coordinator.submit(&form("Typhoid", 2)).unwrap();

        h.coordinator.start_session("H1").unwrap();
        assert_eq!(h.coordinator.state().history().recent().len(), 2);

        h.coordinator.end_session();
        assert!(h.coordinator.state().active_hospital().is_none());
        assert!(h.coordinator.state().history().recent().is_empty());
    }

    /// Queue whose storage can be made to fail on demand.
    struct FlakyQueue {
        inner: SqliteReportQueue,
        fail_writes: AtomicBool,
        fail_removes: AtomicBool,
    }

    impl FlakyQueue {
        fn new() -> Self {
            Self {
                inner: SqliteReportQueue::open_in_memory().unwrap(),
                fail_writes: AtomicBool::new(false),
                fail_removes: AtomicBool::new(false),
            }
        }
    }

    impl ReportQueue for FlakyQueue {
        fn enqueue(&self, report: &PendingBulkReport) -> Result<i64, QueueError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(QueueError::LockPoisoned);
            }
            self.inner.enqueue(report)
        }

        fn list_all(&self) -> Result<Vec<PendingBulkReport>, QueueError> {
            self.inner.list_all()
        }

        fn remove(&self, local_id: i64) -> Result<(), QueueError> {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(QueueError::LockPoisoned);
            }
            self.inner.remove(local_id)
        }

        fn len(&self) -> Result<u32, QueueError> {
            self.inner.len()
        }
    }

    type FlakyParts = (Arc<SubmissionCoordinator>, Arc<FlakyQueue>, Arc<InMemoryReportStore>);

    fn flaky_coordinator(online: bool) -> FlakyParts {
        let queue = Arc::new(FlakyQueue::new());
        let remote = Arc::new(InMemoryReportStore::new());
        let coordinator = SubmissionCoordinator::new(
            queue.clone(),
            remote.clone(),
            Arc::new(ConnectivityMonitor::new(online)),
            Arc::new(CoreState::default()),
        );
        (coordinator, queue, remote)
    }

    #[test]
    fn local_storage_failure_surfaces_when_offline() {
        let (coordinator, queue, _) = flaky_coordinator(false);
        queue.fail_writes.store(true, Ordering::SeqCst);
        let err = coordinator.submit(&form("Cholera", 1)).unwrap_err();
        assert!(matches!(err, SubmitError::LocalStorage(_)));
    }

    #[test]
    fn local_storage_failure_surfaces_after_remote_failure() {
        let (coordinator, queue, remote) = flaky_coordinator(true);
        remote.set_outage(true);
        queue.fail_writes.store(true, Ordering::SeqCst);
        let err = coordinator.submit(&form("Cholera", 1)).unwrap_err();
        assert!(matches!(err, SubmitError::LocalStorage(_)));
    }

    #[test]
    fn failed_local_delete_keeps_record_for_replay() {
        let (coordinator, queue, remote) = flaky_coordinator(false);
        coordinator.submit(&form("Cholera", 1)).unwrap();
        queue.fail_removes.store(true, Ordering::SeqCst);

        assert!(matches!(coordinator.drain(), Err(DrainError::LocalStorage(_))));
        assert_eq!(queue.len().unwrap(), 1);
        assert_eq!(remote.rows().len(), 1);
        let counts = coordinator.state().aggregates().location("L1").unwrap();
        assert_eq!(counts[&Disease::Cholera], 1);

        // Replay carries the same client reference, so no duplicate row.
        queue.fail_removes.store(false, Ordering::SeqCst);
        coordinator.drain().unwrap();
        assert!(queue.is_empty().unwrap());
        assert_eq!(remote.rows().len(), 1);
    }
}
