//! Run-level checkpoints and the per-week run lock.
//!
//! `batch_import_status` holds one row per `(season, season_type, week,
//! import_kind)`. A run takes the lock by moving the row to
//! `in_progress`; a second run is refused until the first finishes or
//! its lock goes stale.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use duckdb::Connection;
use gridiron_database_models::{BatchImportStatus, BatchStatus};
use gridiron_stats_models::{SeasonType, Week};

use crate::{
    DbError, in_transaction, optional, parse_column, text_to_timestamp, timestamp_to_text,
};

/// Age after which an `in_progress` lock is assumed abandoned.
pub const DEFAULT_STALE_LOCK_MINUTES: i64 = 360;

/// Errors from run bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Another run holds a fresh lock.
    #[error("{key} is already being imported (started {started_at:?})")]
    AlreadyRunning {
        /// The locked batch.
        key: BatchKey,
        /// When the holder started.
        started_at: Option<DateTime<Utc>>,
    },

    /// No row exists for the batch.
    #[error("No import recorded for {0}")]
    NotStarted(BatchKey),
}

impl From<duckdb::Error> for BatchError {
    fn from(e: duckdb::Error) -> Self {
        Self::Db(DbError::DuckDb(e))
    }
}

/// Identifies one week's import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// Season year.
    pub season: i32,
    /// Season type.
    pub season_type: SeasonType,
    /// Week.
    pub week: Week,
    /// What is being imported.
    pub import_kind: String,
}

impl BatchKey {
    /// Creates a key.
    #[must_use]
    pub fn new(season: i32, season_type: SeasonType, week: Week, import_kind: &str) -> Self {
        Self {
            season,
            season_type,
            week,
            import_kind: import_kind.to_string(),
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} week {} ({})",
            self.season, self.season_type, self.week, self.import_kind
        )
    }
}

const SELECT_COLUMNS: &str = "SELECT season, season_type, week, import_kind, status, \
                              processed_count, total_count, started_at, completed_at, error \
                              FROM batch_import_status";

type BatchRow = (
    i32,
    String,
    String,
    String,
    String,
    u64,
    u64,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<BatchRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn into_status(row: BatchRow) -> Result<BatchImportStatus, DbError> {
    let (
        season,
        season_type,
        week,
        import_kind,
        status,
        processed,
        total,
        started,
        completed,
        error,
    ) = row;
    Ok(BatchImportStatus {
        season,
        season_type: parse_column("season_type", &season_type)?,
        week: parse_column("week", &week)?,
        import_kind,
        status: parse_column("status", &status)?,
        processed_count: processed,
        total_count: total,
        started_at: started.as_deref().map(text_to_timestamp).transpose()?,
        completed_at: completed.as_deref().map(text_to_timestamp).transpose()?,
        error,
    })
}

/// Fetches the checkpoint of a batch.
///
/// # Errors
///
/// Returns [`BatchError::Db`] on query failure or an unreadable row.
pub fn get(conn: &Connection, key: &BatchKey) -> Result<Option<BatchImportStatus>, BatchError> {
    let row = optional(conn.query_row(
        &format!(
            "{SELECT_COLUMNS} WHERE season = ? AND season_type = ? AND week = ? AND import_kind = ?"
        ),
        duckdb::params![
            key.season,
            key.season_type.to_string(),
            key.week.to_string(),
            key.import_kind
        ],
        read_row,
    ))?;
    Ok(row.map(into_status).transpose()?)
}

/// Takes the run lock for a batch and resets its counters.
///
/// An existing `in_progress` row blocks the run unless it started more
/// than `stale_after` ago, in which case the lock is taken over.
///
/// # Errors
///
/// * [`BatchError::AlreadyRunning`] if a fresh lock is held.
/// * [`BatchError::Db`] on database failure.
pub fn begin_run(
    conn: &Connection,
    key: &BatchKey,
    total: u64,
    now: DateTime<Utc>,
    stale_after: TimeDelta,
) -> Result<BatchImportStatus, BatchError> {
    in_transaction(conn, |conn| {
        let existing = get(conn, key)?;

        if let Some(current) = &existing
            && current.status == BatchStatus::InProgress
        {
            let fresh = current
                .started_at
                .is_some_and(|started| now - started < stale_after);
            if fresh {
                return Err(BatchError::AlreadyRunning {
                    key: key.clone(),
                    started_at: current.started_at,
                });
            }
            log::warn!(
                "{key}: taking over stale lock from run started {:?}",
                current.started_at
            );
        }

        let status = BatchStatus::InProgress.to_string();
        let started_at = timestamp_to_text(now);
        let (season_type, week) = (key.season_type.to_string(), key.week.to_string());
        if existing.is_some() {
            conn.execute(
                "UPDATE batch_import_status
                 SET status = ?, processed_count = 0, total_count = ?, started_at = ?,
                     completed_at = NULL, error = NULL
                 WHERE season = ? AND season_type = ? AND week = ? AND import_kind = ?",
                duckdb::params![
                    status,
                    total,
                    started_at,
                    key.season,
                    season_type,
                    week,
                    key.import_kind
                ],
            )?;
        } else {
            conn.execute(
                "INSERT INTO batch_import_status
                     (status, processed_count, total_count, started_at,
                      season, season_type, week, import_kind)
                 VALUES (?, 0, ?, ?, ?, ?, ?, ?)",
                duckdb::params![
                    status,
                    total,
                    started_at,
                    key.season,
                    season_type,
                    week,
                    key.import_kind
                ],
            )?;
        }

        log::info!("{key}: run started with {total} events");
        get(conn, key)?.ok_or_else(|| BatchError::NotStarted(key.clone()))
    })
}

/// Checkpoints how many events the current run has attempted.
///
/// # Errors
///
/// Returns [`BatchError::Db`] on database failure.
pub fn record_progress(
    conn: &Connection,
    key: &BatchKey,
    processed: u64,
) -> Result<(), BatchError> {
    conn.execute(
        "UPDATE batch_import_status SET processed_count = ?
         WHERE season = ? AND season_type = ? AND week = ? AND import_kind = ?",
        duckdb::params![
            processed,
            key.season,
            key.season_type.to_string(),
            key.week.to_string(),
            key.import_kind
        ],
    )?;
    Ok(())
}

/// Releases the lock with a final status.
///
/// # Errors
///
/// * [`BatchError::NotStarted`] if the batch has no row.
/// * [`BatchError::Db`] on database failure.
pub fn finish_run(
    conn: &Connection,
    key: &BatchKey,
    status: BatchStatus,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<BatchImportStatus, BatchError> {
    let changed = conn.execute(
        "UPDATE batch_import_status SET status = ?, completed_at = ?, error = ?
         WHERE season = ? AND season_type = ? AND week = ? AND import_kind = ?",
        duckdb::params![
            status.to_string(),
            timestamp_to_text(now),
            error,
            key.season,
            key.season_type.to_string(),
            key.week.to_string(),
            key.import_kind
        ],
    )?;
    if changed == 0 {
        return Err(BatchError::NotStarted(key.clone()));
    }

    log::info!("{key}: run finished as {status}");
    get(conn, key)?.ok_or_else(|| BatchError::NotStarted(key.clone()))
}

/// Every recorded batch, newest season first.
///
/// # Errors
///
/// Returns [`BatchError::Db`] on database failure.
pub fn list(conn: &Connection) -> Result<Vec<BatchImportStatus>, BatchError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} ORDER BY season DESC, season_type, week, import_kind"
    ))?;
    let rows: Vec<BatchRow> = stmt.query_map([], read_row)?.collect::<Result<_, _>>()?;
    Ok(rows
        .into_iter()
        .map(into_status)
        .collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use gridiron_database_models::BOXSCORE_IMPORT;

    use super::*;
    use crate::open_in_memory;

    fn key() -> BatchKey {
        BatchKey::new(2025, SeasonType::Regular, Week::Number(1), BOXSCORE_IMPORT)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, hour, 0, 0).unwrap()
    }

    fn stale() -> TimeDelta {
        TimeDelta::minutes(DEFAULT_STALE_LOCK_MINUTES)
    }

    #[test]
    fn run_lifecycle_checkpoints_progress() {
        let conn = open_in_memory().unwrap();
        let started = begin_run(&conn, &key(), 4, at(1), stale()).unwrap();
        assert_eq!(started.status, BatchStatus::InProgress);
        assert_eq!((started.processed_count, started.total_count), (0, 4));

        record_progress(&conn, &key(), 3).unwrap();
        let done = finish_run(&conn, &key(), BatchStatus::Completed, None, at(2)).unwrap();
        assert_eq!(done.processed_count, 3);
        assert_eq!(done.completed_at, Some(at(2)));
        assert_eq!(key().to_string(), "2025 regular week 1 (boxscore)");
    }

    #[test]
    fn fresh_lock_refuses_second_run() {
        let conn = open_in_memory().unwrap();
        begin_run(&conn, &key(), 4, at(1), stale()).unwrap();

        let err = begin_run(&conn, &key(), 4, at(2), stale()).unwrap_err();
        assert!(matches!(
            err,
            BatchError::AlreadyRunning { started_at: Some(t), .. } if t == at(1)
        ));
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let conn = open_in_memory().unwrap();
        begin_run(&conn, &key(), 4, at(1), stale()).unwrap();
        record_progress(&conn, &key(), 2).unwrap();

        let taken = begin_run(&conn, &key(), 2, at(8), stale()).unwrap();
        assert_eq!(taken.started_at, Some(at(8)));
        assert_eq!((taken.processed_count, taken.total_count), (0, 2));
    }

    #[test]
    fn finished_run_can_be_restarted() {
        let conn = open_in_memory().unwrap();
        begin_run(&conn, &key(), 4, at(1), stale()).unwrap();
        finish_run(&conn, &key(), BatchStatus::Failed, Some("interrupted"), at(2)).unwrap();

        let again = begin_run(&conn, &key(), 1, at(3), stale()).unwrap();
        assert_eq!(again.error, None);
        assert_eq!(again.completed_at, None);
        assert_eq!(list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn finishing_unknown_batch_errors() {
        let conn = open_in_memory().unwrap();
        let err = finish_run(&conn, &key(), BatchStatus::Completed, None, at(1)).unwrap_err();
        assert!(matches!(err, BatchError::NotStarted(_)));
    }
}
