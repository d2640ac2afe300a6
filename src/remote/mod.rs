//! Remote report store: the shared, authoritative home of confirmed reports.
//!
//! Two implementations:
//! - `SupabaseReportStore`: PostgREST over blocking HTTP
//! - `InMemoryReportStore`: in-process fake with scripted failures

pub mod memory;
pub mod supabase;

pub use memory::InMemoryReportStore;
pub use supabase::SupabaseReportStore;

use thiserror::Error;

use crate::models::{CaseReport, NewCaseReport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Cannot reach report store at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Report store returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Report store unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Whether a later retry of the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::HttpClient(_) | Self::ResponseParsing(_) => false,
        }
    }
}

/// Which rows to read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFilter {
    /// Every confirmed report (aggregate recompute).
    All,
    /// The newest `limit` reports of one hospital, report date descending.
    RecentForHospital { hospital_id: String, limit: usize },
}

/// Append-only store of confirmed case reports.
pub trait ReportStore: Send + Sync {
    fn insert(&self, report: &NewCaseReport) -> Result<(), RemoteError>;

    fn query(&self, filter: &ReportFilter) -> Result<Vec<CaseReport>, RemoteError>;
}
