use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{RemoteError, ReportFilter, ReportStore};
use crate::connectivity::ReachabilityProbe;
use crate::models::{CaseReport, NewCaseReport};

/// In-process stand-in for the hosted report store.
///
/// Supports a whole-store outage switch and a per-call insert script
/// (`true` = that call fails). Client references are deduplicated the way
/// the hosted store does when an idempotency column is configured.
#[derive(Default)]
pub struct InMemoryReportStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<CaseReport>,
    next_id: i64,
    seen_refs: HashSet<Uuid>,
    insert_script: VecDeque<bool>,
    outage: bool,
    insert_calls: usize,
    query_calls: usize,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with confirmed rows.
    pub fn with_rows(rows: Vec<CaseReport>) -> Self {
        let next_id = rows.iter().map(|r| r.id).max().unwrap_or(0);
        Self {
            inner: Mutex::new(Inner {
                rows,
                next_id,
                ..Inner::default()
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue outcomes for upcoming insert calls, in order. Calls past the
    /// end of the script succeed.
    pub fn script_inserts(&self, fails: &[bool]) {
        self.inner().insert_script.extend(fails.iter().copied());
    }

    /// Fail every insert and query until switched back.
    pub fn set_outage(&self, outage: bool) {
        self.inner().outage = outage;
    }

    /// Snapshot of confirmed rows in insertion order.
    pub fn rows(&self) -> Vec<CaseReport> {
        self.inner().rows.clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.inner().insert_calls
    }

    pub fn query_calls(&self) -> usize {
        self.inner().query_calls
    }
}

impl ReportStore for InMemoryReportStore {
    fn insert(&self, report: &NewCaseReport) -> Result<(), RemoteError> {
        let mut inner = self.inner();
        inner.insert_calls += 1;

        if inner.outage {
            return Err(RemoteError::Connection("in-memory store (outage)".into()));
        }
        if inner.insert_script.pop_front().unwrap_or(false) {
            return Err(RemoteError::Unavailable("scripted insert failure".into()));
        }

        if let Some(client_ref) = report.client_ref {
            if !inner.seen_refs.insert(client_ref) {
                return Ok(());
            }
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(CaseReport {
            id,
            hospital_id: report.hospital_id.clone(),
            location_id: report.location_id.clone(),
            disease: report.disease,
            case_count: report.case_count,
            report_date: report.report_date,
        });
        Ok(())
    }

    fn query(&self, filter: &ReportFilter) -> Result<Vec<CaseReport>, RemoteError> {
        let mut inner = self.inner();
        inner.query_calls += 1;

        if inner.outage {
            return Err(RemoteError::Connection("in-memory store (outage)".into()));
        }

        Ok(match filter {
            ReportFilter::All => inner.rows.clone(),
            ReportFilter::RecentForHospital { hospital_id, limit } => {
                let mut rows: Vec<CaseReport> = inner
                    .rows
                    .iter()
                    .filter(|r| &r.hospital_id == hospital_id)
                    .cloned()
                    .collect();
                // Newest date first; ties keep the most recently inserted first.
                rows.sort_by(|a, b| b.report_date.cmp(&a.report_date).then(b.id.cmp(&a.id)));
                rows.truncate(*limit);
                rows
            }
        })
    }
}

impl ReachabilityProbe for InMemoryReportStore {
    fn probe(&self) -> bool {
        !self.inner().outage
    }
}
