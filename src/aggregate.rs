//! Per-location, per-disease case totals derived from confirmed reports.
//!
//! Always rebuilt from a full scan of the remote store. A failed scan
//! leaves the previous view in place so the dashboard keeps showing
//! last-known-good numbers.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::config::DEFAULT_OUTBREAK_THRESHOLD;
use crate::locations;
use crate::models::{CaseReport, Disease, OutbreakAlert};
use crate::remote::{RemoteError, ReportFilter, ReportStore};

/// Case totals for one location, keyed in enumeration order.
pub type DiseaseCounts = BTreeMap<Disease, u64>;

/// Location id → totals.
pub type LocationAggregates = BTreeMap<String, DiseaseCounts>;

pub fn zero_counts() -> DiseaseCounts {
    Disease::ALL.iter().map(|d| (*d, 0)).collect()
}

/// Sum `case_count` by (location, disease). Every id in `seed` appears in
/// the result even with no reports; locations outside `seed` are included
/// as soon as they have a report.
pub fn aggregate_reports(reports: &[CaseReport], seed: &[String]) -> LocationAggregates {
    let mut aggregates: LocationAggregates =
        seed.iter().map(|id| (id.clone(), zero_counts())).collect();

    for report in reports {
        *aggregates
            .entry(report.location_id.clone())
            .or_insert_with(zero_counts)
            .entry(report.disease)
            .or_insert(0) += u64::from(report.case_count);
    }
    aggregates
}

pub struct AggregateView {
    seed: Vec<String>,
    outbreak_threshold: u64,
    by_location: RwLock<LocationAggregates>,
    refreshed_at: RwLock<Option<DateTime<Utc>>>,
}

impl AggregateView {
    pub fn new(seed: Vec<String>, outbreak_threshold: u64) -> Self {
        let initial = aggregate_reports(&[], &seed);
        Self {
            seed,
            outbreak_threshold,
            by_location: RwLock::new(initial),
            refreshed_at: RwLock::new(None),
        }
    }

    /// Seeded with the known-location catalog and the default threshold.
    pub fn with_known_locations() -> Self {
        Self::new(locations::known_location_ids(), DEFAULT_OUTBREAK_THRESHOLD)
    }

    /// Rescan every confirmed report and replace the view wholesale.
    /// Returns the number of reports scanned.
    pub fn recompute(&self, store: &dyn ReportStore) -> Result<usize, RemoteError> {
        let reports = match store.query(&ReportFilter::All) {
            Ok(reports) => reports,
            Err(e) => {
                tracing::warn!(error = %e, "Aggregate recompute failed, keeping previous figures");
                return Err(e);
            }
        };

        let fresh = aggregate_reports(&reports, &self.seed);
        *self.by_location.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        *self.refreshed_at.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        tracing::debug!(reports = reports.len(), "Aggregates recomputed");
        Ok(reports.len())
    }

    pub fn location(&self, location_id: &str) -> Option<DiseaseCounts> {
        self.by_location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location_id)
            .cloned()
    }

    pub fn snapshot(&self) -> LocationAggregates {
        self.by_location.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cases across all diseases at a location (0 if unknown).
    pub fn total_cases(&self, location_id: &str) -> u64 {
        self.location(location_id)
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    /// First disease, in enumeration order, whose total exceeds the threshold.
    pub fn outbreak_alert(&self, location_id: &str) -> Option<OutbreakAlert> {
        let counts = self.location(location_id)?;
        counts
            .into_iter()
            .find(|(_, cases)| *cases > self.outbreak_threshold)
            .map(|(disease, cases)| OutbreakAlert {
                location_id: location_id.to_string(),
                disease,
                cases,
                threshold: self.outbreak_threshold,
            })
    }

    /// When the view last reflected a successful scan.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        *self.refreshed_at.read().unwrap_or_else(PoisonError::into_inner)
    }
}
