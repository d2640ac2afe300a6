use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::{RemoteError, ReportFilter, ReportStore};
use crate::config::SyncConfig;
use crate::connectivity::ReachabilityProbe;
use crate::models::{CaseReport, Disease, NewCaseReport};

/// Rows requested per page on a full scan. Matches the default `max-rows`
/// cap of hosted PostgREST, which truncates larger responses silently.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// PostgREST client for the hosted `case_reports` table.
pub struct SupabaseReportStore {
    base_url: String,
    api_key: String,
    table: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    idempotency_column: Option<String>,
    page_size: usize,
}

impl SupabaseReportStore {
    /// Create a client. Every request is bounded by `timeout_secs`.
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
            client,
            timeout_secs,
            idempotency_column: None,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, RemoteError> {
        let store = Self::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            &config.table,
            config.request_timeout_secs,
        )?;
        Ok(match &config.idempotency_column {
            Some(column) => store.with_idempotency_column(column),
            None => store,
        })
    }

    /// Send each queued report's client reference in `column` and ask the
    /// store to ignore rows that conflict on it. Needs a unique constraint
    /// on that column remotely.
    pub fn with_idempotency_column(mut self, column: &str) -> Self {
        self.idempotency_column = Some(column.to_string());
        self
    }

    /// Page size for full scans. Must not exceed the server's `max-rows`,
    /// otherwise a capped page looks like the last one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn map_send_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_connect() {
            RemoteError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            RemoteError::Timeout(self.timeout_secs)
        } else {
            RemoteError::HttpClient(e.to_string())
        }
    }

    fn insert_body(&self, report: &NewCaseReport) -> serde_json::Value {
        let mut body = json!({
            "hospital_id": report.hospital_id,
            "location_id": report.location_id,
            "disease": report.disease.as_str(),
            "case_count": report.case_count,
            "report_date": report.report_date.to_string(),
        });
        if let (Some(column), Some(client_ref)) = (&self.idempotency_column, report.client_ref) {
            body[column.as_str()] = json!(client_ref.to_string());
        }
        body
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Row shape returned by PostgREST. Kept loose so one bad row does not
/// fail the whole read.
#[derive(Debug, Deserialize)]
struct CaseReportRow {
    id: i64,
    hospital_id: String,
    location_id: String,
    disease: String,
    case_count: i64,
    report_date: String,
}

impl SupabaseReportStore {
    fn fetch(&self, params: &[(&str, String)]) -> Result<Vec<CaseReportRow>, RemoteError> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(params)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        Self::check_status(response)?
            .json()
            .map_err(|e| RemoteError::ResponseParsing(e.to_string()))
    }

    /// One page of a full scan. Ordered by primary key so pages are stable.
    fn page_params(&self, offset: usize) -> Vec<(&'static str, String)> {
        vec![
            ("select", "*".to_string()),
            ("order", "id.asc".to_string()),
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ]
    }
}

fn recent_params(hospital_id: &str, limit: usize) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("hospital_id", format!("eq.{hospital_id}")),
        ("order", "report_date.desc".to_string()),
        ("limit", limit.to_string()),
    ]
}

/// Fetch pages of `page_size` until one comes back short.
fn scan_pages<T, F>(page_size: usize, mut fetch: F) -> Result<Vec<T>, RemoteError>
where
    F: FnMut(usize) -> Result<Vec<T>, RemoteError>,
{
    let mut all = Vec::new();
    loop {
        let page = fetch(all.len())?;
        let last = page.len() < page_size;
        all.extend(page);
        if last {
            return Ok(all);
        }
    }
}

fn rows_to_reports(rows: Vec<CaseReportRow>) -> Vec<CaseReport> {
    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        let Ok(disease) = Disease::from_str(&row.disease) else {
            tracing::warn!(
                id = row.id,
                disease = %row.disease,
                "Skipping report with unknown disease"
            );
            continue;
        };
        let Ok(case_count) = u32::try_from(row.case_count) else {
            tracing::warn!(
                id = row.id,
                case_count = row.case_count,
                "Skipping report with invalid case count"
            );
            continue;
        };
        // PostgREST renders `date` columns as YYYY-MM-DD; tolerate a timestamp suffix.
        let date_part = row.report_date.get(..10).unwrap_or(&row.report_date);
        let Ok(report_date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            tracing::warn!(
                id = row.id,
                report_date = %row.report_date,
                "Skipping report with invalid date"
            );
            continue;
        };
        reports.push(CaseReport {
            id: row.id,
            hospital_id: row.hospital_id,
            location_id: row.location_id,
            disease,
            case_count,
            report_date,
        });
    }
    reports
}

impl ReportStore for SupabaseReportStore {
    fn insert(&self, report: &NewCaseReport) -> Result<(), RemoteError> {
        let mut request = self.authorized(self.client.post(self.table_url()));

        let dedupe = self.idempotency_column.as_ref().filter(|_| report.client_ref.is_some());
        request = match dedupe {
            Some(column) => request
                .query(&[("on_conflict", column.as_str())])
                .header("Prefer", "resolution=ignore-duplicates,return=minimal"),
            None => request.header("Prefer", "return=minimal"),
        };

        let response = request
            .json(&self.insert_body(report))
            .send()
            .map_err(|e| self.map_send_error(e))?;

        Self::check_status(response)?;
        Ok(())
    }

    fn query(&self, filter: &ReportFilter) -> Result<Vec<CaseReport>, RemoteError> {
        let rows = match filter {
            ReportFilter::All => {
                scan_pages(self.page_size, |offset| self.fetch(&self.page_params(offset)))?
            }
            ReportFilter::RecentForHospital { hospital_id, limit } => {
                self.fetch(&recent_params(hospital_id, *limit))?
            }
        };
        Ok(rows_to_reports(rows))
    }
}

impl ReachabilityProbe for SupabaseReportStore {
    /// Any HTTP answer counts as reachable; only transport failures do not.
    fn probe(&self) -> bool {
        let url = format!("{}/rest/v1/", self.base_url);
        match self.authorized(self.client.get(url)).send() {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Report store unreachable");
                false
            }
        }
    }
}
