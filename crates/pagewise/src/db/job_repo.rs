//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, params_from_iter, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
///
/// `pages` and `destination` are stored as JSON text; decoding into
/// domain types happens in the store layer.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub source_ref: String,
    pub model: String,
    pub prompt: String,
    pub pages: String,
    pub destination: String,
    pub status: String,
    pub error: Option<String>,
    pub original_filename: String,
    pub filename_stem: String,
    pub is_batch: bool,
    pub created_at: String,
    pub updated_at: String,
    pub processing_started_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            source_ref: row.get("source_ref")?,
            model: row.get("model")?,
            prompt: row.get("prompt")?,
            pages: row.get("pages")?,
            destination: row.get("destination")?,
            status: row.get("status")?,
            error: row.get("error")?,
            original_filename: row.get("original_filename")?,
            filename_stem: row.get("filename_stem")?,
            is_batch: row.get("is_batch")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            processing_started_at: row.get("processing_started_at")?,
        })
    }
}

/// Inserts a new job row. Fails with a constraint violation on id collision.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, source_ref, model, prompt, pages, destination, status,
             error, original_filename, filename_stem, is_batch, created_at, updated_at,
             processing_started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                job.id,
                job.source_ref,
                job.model,
                job.prompt,
                job.pages,
                job.destination,
                job.status,
                job.error,
                job.original_filename,
                job.filename_stem,
                job.is_batch,
                job.created_at,
                job.updated_at,
                job.processing_started_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Moves a job to `status` only if its current status is one of `from`.
///
/// Returns `true` when a row changed. A job in any other status (or a
/// missing job) is left untouched and yields `false`.
pub fn update_status(
    db: &Database,
    id: &str,
    from: &[&str],
    status: &str,
    error: Option<&str>,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    if from.is_empty() {
        return Ok(false);
    }

    db.with_conn(|conn| {
        let placeholders: Vec<String> = (0..from.len()).map(|i| format!("?{}", i + 5)).collect();
        let sql = format!(
            "UPDATE jobs SET status = ?2, error = ?3, updated_at = ?4
             WHERE id = ?1 AND status IN ({})",
            placeholders.join(", ")
        );

        let mut values: Vec<Option<&str>> = vec![Some(id), Some(status), error, Some(updated_at)];
        values.extend(from.iter().map(|s| Some(*s)));

        let changed = conn.execute(&sql, params_from_iter(values))?;
        Ok(changed > 0)
    })
}

/// Records the first-processing timestamp and moves `ready` to `running`.
///
/// The timestamp is written only when it is still unset. Returns the stored
/// timestamp (new or pre-existing), or `None` if the job does not exist.
pub fn touch_processing_started(
    db: &Database,
    id: &str,
    now: &str,
) -> Result<Option<String>, DatabaseError> {
    db.with_transaction(|tx| {
        let changed = tx.execute(
            "UPDATE jobs SET
                 processing_started_at = COALESCE(processing_started_at, ?2),
                 status = CASE WHEN status = 'ready' THEN 'running' ELSE status END,
                 updated_at = ?2
             WHERE id = ?1",
            params![id, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        let started: Option<String> = tx.query_row(
            "SELECT processing_started_at FROM jobs WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(started)
    })
}

/// Marks the job as being completed by the caller.
///
/// Succeeds for exactly one caller per job, and only while the job is
/// `ready` or `running`.
pub fn claim_completion(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET completion_claimed_at = ?2, updated_at = ?2
             WHERE id = ?1 AND completion_claimed_at IS NULL
               AND status IN ('ready', 'running')",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}

/// Deletes a job. Page results go with it through the foreign-key cascade.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Deletes every job whose `updated_at` is strictly before `cutoff`.
/// Returns the number of jobs removed.
pub fn delete_updated_before(db: &Database, cutoff: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute("DELETE FROM jobs WHERE updated_at < ?1", params![cutoff])?;
        Ok(removed as u64)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
