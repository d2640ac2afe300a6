use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

/// Persist a pending report and return the local id SQLite assigned.
pub fn insert_pending_report(
    conn: &Connection,
    report: &PendingBulkReport,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO pending_bulk_reports
         (client_ref, hospital_id, location_id, disease, case_count, report_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.client_ref.to_string(),
            report.hospital_id,
            report.location_id,
            report.disease.as_str(),
            report.case_count,
            report.report_date.to_string(),
            report.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All queued reports, oldest first.
pub fn list_pending_reports(conn: &Connection) -> Result<Vec<PendingBulkReport>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT local_id, client_ref, hospital_id, location_id, disease, case_count,
         report_date, created_at
         FROM pending_bulk_reports ORDER BY local_id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, u32>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut reports = Vec::new();
    for row in rows {
        let (
            local_id,
            client_ref,
            hospital_id,
            location_id,
            disease,
            case_count,
            report_date,
            created_at,
        ) = row?;
        reports.push(PendingBulkReport {
            local_id: Some(local_id),
            client_ref: Uuid::parse_str(&client_ref)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            hospital_id,
            location_id,
            disease: Disease::from_str(&disease)?,
            case_count,
            report_date: NaiveDate::parse_from_str(&report_date, "%Y-%m-%d")
                .map_err(|e| DatabaseError::ConstraintViolation(format!("report_date: {e}")))?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| DatabaseError::ConstraintViolation(format!("created_at: {e}")))?,
        });
    }
    Ok(reports)
}

/// Delete by local id. Deleting an absent id is not an error.
pub fn delete_pending_report(conn: &Connection, local_id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM pending_bulk_reports WHERE local_id = ?1",
        params![local_id],
    )?;
    Ok(())
}

pub fn count_pending_reports(conn: &Connection) -> Result<u32, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM pending_bulk_reports", [], |row| {
        row.get::<_, u32>(0)
    })?;
    Ok(count)
}
