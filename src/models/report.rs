use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Disease;

/// Raw submission as entered on the report form. Not yet validated:
/// the disease is free text and the count may be zero or negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportForm {
    pub hospital_id: String,
    pub location_id: String,
    pub disease: String,
    pub case_count: i64,
    pub report_date: NaiveDate,
}

/// A validated bulk case report: N cases of one disease at one location on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub hospital_id: String,
    pub location_id: String,
    pub disease: Disease,
    pub case_count: u32,
    pub report_date: NaiveDate,
}

/// A bulk report waiting in the local queue for remote confirmation.
///
/// Never mutated once persisted; a retry replays the stored record as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBulkReport {
    /// Assigned by the queue. `None` until persisted.
    pub local_id: Option<i64>,
    /// Client-generated key, stable across replays of the same record.
    pub client_ref: Uuid,
    pub hospital_id: String,
    pub location_id: String,
    pub disease: Disease,
    pub case_count: u32,
    pub report_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl PendingBulkReport {
    /// Wrap a validated report for queueing, stamping a fresh client reference.
    pub fn new(report: BulkReport, created_at: DateTime<Utc>) -> Self {
        Self {
            local_id: None,
            client_ref: Uuid::new_v4(),
            hospital_id: report.hospital_id,
            location_id: report.location_id,
            disease: report.disease,
            case_count: report.case_count,
            report_date: report.report_date,
            created_at,
        }
    }

    /// Insert payload for the remote store.
    pub fn to_insert(&self) -> NewCaseReport {
        NewCaseReport {
            hospital_id: self.hospital_id.clone(),
            location_id: self.location_id.clone(),
            disease: self.disease,
            case_count: self.case_count,
            report_date: self.report_date,
            client_ref: Some(self.client_ref),
        }
    }
}

/// Row sent to the remote store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCaseReport {
    pub hospital_id: String,
    pub location_id: String,
    pub disease: Disease,
    pub case_count: u32,
    pub report_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<Uuid>,
}

/// A confirmed report as stored remotely. Read-only on this side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub id: i64,
    pub hospital_id: String,
    pub location_id: String,
    pub disease: Disease,
    pub case_count: u32,
    pub report_date: NaiveDate,
}
