//! Page result repository: one row per (job, page).

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A stored page result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResultRow {
    pub job_id: String,
    pub page_number: u32,
    pub text: String,
    pub image_size_bytes: u64,
    pub created_at: String,
}

impl PageResultRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            page_number: row.get("page_number")?,
            text: row.get("text")?,
            image_size_bytes: row.get("image_size_bytes")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts or replaces the result for `(job_id, page_number)`.
pub fn upsert(db: &Database, row: &PageResultRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO page_results (job_id, page_number, text, image_size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(job_id, page_number) DO UPDATE SET
                 text = excluded.text,
                 image_size_bytes = excluded.image_size_bytes,
                 created_at = excluded.created_at",
            params![
                row.job_id,
                row.page_number,
                row.text,
                row.image_size_bytes,
                row.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Lists all results for a job in ascending page order.
pub fn list_by_job(db: &Database, job_id: &str) -> Result<Vec<PageResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM page_results WHERE job_id = ?1 ORDER BY page_number ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], PageResultRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns the page numbers that already have a stored result.
pub fn stored_pages(db: &Database, job_id: &str) -> Result<Vec<u32>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT page_number FROM page_results WHERE job_id = ?1 ORDER BY page_number ASC",
        )?;
        let pages = stmt
            .query_map(params![job_id], |r| r.get(0))?
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(pages)
    })
}

/// Deletes every result stored for a job, leaving the job row in place.
pub fn delete_by_job(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute("DELETE FROM page_results WHERE job_id = ?1", params![job_id])?;
        Ok(removed as u64)
    })
}
