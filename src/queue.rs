//! Durable local queue of bulk reports awaiting remote confirmation.
//!
//! Records survive process restarts and are handed back in insertion
//! order. Nothing is ever dropped silently: a storage failure surfaces as
//! a `QueueError` to the caller.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;

use crate::db::{self, DatabaseError};
use crate::models::PendingBulkReport;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue lock poisoned")]
    LockPoisoned,

    #[error("Report already queued with local id {0}")]
    AlreadyQueued(i64),
}

/// Storage seam for pending reports.
pub trait ReportQueue: Send + Sync {
    /// Persist a report that has no local id yet; returns the assigned id.
    fn enqueue(&self, report: &PendingBulkReport) -> Result<i64, QueueError>;

    /// All queued reports, oldest first.
    fn list_all(&self) -> Result<Vec<PendingBulkReport>, QueueError>;

    /// Remove a report. Removing an absent id succeeds.
    fn remove(&self, local_id: i64) -> Result<(), QueueError>;

    /// Number of reports waiting.
    fn len(&self) -> Result<u32, QueueError>;

    fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

/// SQLite-backed queue. One connection, serialised behind a mutex.
pub struct SqliteReportQueue {
    conn: Mutex<Connection>,
}

impl SqliteReportQueue {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let conn = db::open_database(path)?;
        tracing::debug!(path = %path.display(), "Pending report queue opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory queue (for testing).
    pub fn open_in_memory() -> Result<Self, QueueError> {
        Ok(Self {
            conn: Mutex::new(db::open_memory_database()?),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn.lock().map_err(|_| QueueError::LockPoisoned)
    }
}

impl ReportQueue for SqliteReportQueue {
    fn enqueue(&self, report: &PendingBulkReport) -> Result<i64, QueueError> {
        if let Some(id) = report.local_id {
            return Err(QueueError::AlreadyQueued(id));
        }
        let conn = self.conn()?;
        let local_id = db::insert_pending_report(&conn, report)?;
        tracing::debug!(
            local_id,
            client_ref = %report.client_ref,
            "Report queued locally"
        );
        Ok(local_id)
    }

    fn list_all(&self) -> Result<Vec<PendingBulkReport>, QueueError> {
        let conn = self.conn()?;
        Ok(db::list_pending_reports(&conn)?)
    }

    fn remove(&self, local_id: i64) -> Result<(), QueueError> {
        let conn = self.conn()?;
        db::delete_pending_report(&conn, local_id)?;
        Ok(())
    }

    fn len(&self) -> Result<u32, QueueError> {
        let conn = self.conn()?;
        Ok(db::count_pending_reports(&conn)?)
    }
}
