//! Most recent confirmed reports of the acting hospital.

use std::sync::{PoisonError, RwLock};

use chrono::{Duration, NaiveDate};

use crate::config::DEFAULT_HISTORY_LIMIT;
use crate::models::CaseReport;
use crate::remote::{RemoteError, ReportFilter, ReportStore};

pub struct HospitalHistory {
    limit: usize,
    reports: RwLock<Vec<CaseReport>>,
}

impl Default for HospitalHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HospitalHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            reports: RwLock::new(Vec::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Re-read the newest reports for `hospital_id` and replace the cache.
    /// On failure the cached list is left as it was.
    pub fn refresh(&self, store: &dyn ReportStore, hospital_id: &str) -> Result<(), RemoteError> {
        if hospital_id.is_empty() {
            return Ok(());
        }

        let filter = ReportFilter::RecentForHospital {
            hospital_id: hospital_id.to_string(),
            limit: self.limit,
        };
        match store.query(&filter) {
            Ok(mut reports) => {
                reports.truncate(self.limit);
                *self.reports.write().unwrap_or_else(PoisonError::into_inner) = reports;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    hospital_id,
                    error = %e,
                    "History refresh failed, keeping previous list"
                );
                Err(e)
            }
        }
    }

    /// Cached reports, newest report date first.
    pub fn recent(&self) -> Vec<CaseReport> {
        self.reports.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cached reports dated within the last `days` days up to `today`.
    pub fn count_since(&self, today: NaiveDate, days: i64) -> usize {
        let cutoff = today - Duration::days(days);
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.report_date >= cutoff)
            .count()
    }

    pub fn clear(&self) {
        self.reports.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
