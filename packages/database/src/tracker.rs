//! Per-event progress tracking.
//!
//! One `event_import_status` row per `(event_id, import_kind)` records
//! where each event stands, so an interrupted run resumes where it left
//! off and repeatedly failing events stop being retried.

use chrono::{DateTime, Utc};
use duckdb::Connection;
use gridiron_database_models::{EventImportStatus, EventState};
use gridiron_stats_models::{EventRef, SeasonType, Week};

use crate::{DbError, optional, parse_column, text_to_timestamp, timestamp_to_text};

/// Failures after which an event is given up on.
pub const DEFAULT_MAX_EVENT_RETRIES: u32 = 3;

/// Errors from the event tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The requested state change is not part of the lifecycle.
    #[error("Event {event_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Source event id.
        event_id: String,
        /// Current state.
        from: EventState,
        /// Requested state.
        to: EventState,
    },
}

impl From<duckdb::Error> for TrackerError {
    fn from(e: duckdb::Error) -> Self {
        Self::Db(DbError::DuckDb(e))
    }
}

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Loaded and committed.
    Completed,
    /// Failed with the given message.
    Failed(String),
}

const SELECT_COLUMNS: &str = "SELECT event_id, import_kind, season, season_type, week, state, \
                              attempts, last_error, updated_at FROM event_import_status";

type StatusRow = (
    String,
    String,
    i32,
    String,
    String,
    String,
    u32,
    Option<String>,
    String,
);

fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<StatusRow> {
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
    ))
}

fn into_status(row: StatusRow) -> Result<EventImportStatus, DbError> {
    let (
        event_id,
        import_kind,
        season,
        season_type,
        week,
        state,
        attempts,
        last_error,
        updated_at,
    ) = row;
    Ok(EventImportStatus {
        event_id,
        import_kind,
        season,
        season_type: parse_column("season_type", &season_type)?,
        week: parse_column("week", &week)?,
        state: parse_column("state", &state)?,
        attempts,
        last_error,
        updated_at: text_to_timestamp(&updated_at)?,
    })
}

/// Fetches the tracker row of an event.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on query failure or an unreadable row.
pub fn get(
    conn: &Connection,
    event_id: &str,
    import_kind: &str,
) -> Result<Option<EventImportStatus>, TrackerError> {
    let row = optional(conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE event_id = ? AND import_kind = ?"),
        [event_id, import_kind],
        read_row,
    ))?;
    Ok(row.map(into_status).transpose()?)
}

/// Current state of an event; [`EventState::Unseen`] without a row.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on query failure.
pub fn state(
    conn: &Connection,
    event_id: &str,
    import_kind: &str,
) -> Result<EventState, TrackerError> {
    Ok(get(conn, event_id, import_kind)?.map_or(EventState::Unseen, |s| s.state))
}

/// Inserts a `Pending` row for every event without one. Existing rows
/// keep their state. Returns how many rows were created.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on database failure.
pub fn register(
    conn: &Connection,
    events: &[EventRef],
    import_kind: &str,
    now: DateTime<Utc>,
) -> Result<usize, TrackerError> {
    let mut created = 0;
    for event in events {
        created += conn.execute(
            "INSERT INTO event_import_status
                 (event_id, import_kind, season, season_type, week, state, attempts, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT (event_id, import_kind) DO NOTHING",
            duckdb::params![
                event.id,
                import_kind,
                event.season,
                event.season_type.to_string(),
                event.week.to_string(),
                EventState::Pending.to_string(),
                timestamp_to_text(now)
            ],
        )?;
    }
    if created > 0 {
        log::debug!("Registered {created} new events");
    }
    Ok(created)
}

fn transition(
    conn: &Connection,
    event_id: &str,
    import_kind: &str,
    to: EventState,
) -> Result<EventImportStatus, TrackerError> {
    let current = get(conn, event_id, import_kind)?;
    let from = current.as_ref().map_or(EventState::Unseen, |s| s.state);
    match current {
        Some(status) if from.can_transition_to(to) => Ok(status),
        _ => Err(TrackerError::InvalidTransition {
            event_id: event_id.to_string(),
            from,
            to,
        }),
    }
}

/// Marks an event as being worked on.
///
/// # Errors
///
/// * [`TrackerError::InvalidTransition`] if the event is unregistered or
///   its state cannot move to `Fetching`.
/// * [`TrackerError::Db`] on database failure.
pub fn mark_fetching(
    conn: &Connection,
    event_id: &str,
    import_kind: &str,
    now: DateTime<Utc>,
) -> Result<(), TrackerError> {
    transition(conn, event_id, import_kind, EventState::Fetching)?;
    conn.execute(
        "UPDATE event_import_status SET state = ?, updated_at = ?
         WHERE event_id = ? AND import_kind = ?",
        duckdb::params![
            EventState::Fetching.to_string(),
            timestamp_to_text(now),
            event_id,
            import_kind
        ],
    )?;
    Ok(())
}

/// Records the outcome of a fetching event and returns its new state.
///
/// A failure increments `attempts`; reaching `max_retries` makes the
/// event [`EventState::PermanentlyFailed`].
///
/// # Errors
///
/// * [`TrackerError::InvalidTransition`] if the event is not `Fetching`.
/// * [`TrackerError::Db`] on database failure.
pub fn record(
    conn: &Connection,
    event_id: &str,
    import_kind: &str,
    outcome: &Outcome,
    max_retries: u32,
    now: DateTime<Utc>,
) -> Result<EventState, TrackerError> {
    let (next, attempts, last_error) = match outcome {
        Outcome::Completed => {
            let status = transition(conn, event_id, import_kind, EventState::Completed)?;
            (EventState::Completed, status.attempts, None)
        }
        Outcome::Failed(message) => {
            let status = transition(conn, event_id, import_kind, EventState::Failed)?;
            let attempts = status.attempts + 1;
            let next = if attempts >= max_retries {
                log::warn!("Event {event_id}: giving up after {attempts} failures: {message}");
                EventState::PermanentlyFailed
            } else {
                EventState::Failed
            };
            (next, attempts, Some(message.as_str()))
        }
    };

    conn.execute(
        "UPDATE event_import_status SET state = ?, attempts = ?, last_error = ?, updated_at = ?
         WHERE event_id = ? AND import_kind = ?",
        duckdb::params![
            next.to_string(),
            attempts,
            last_error,
            timestamp_to_text(now),
            event_id,
            import_kind
        ],
    )?;
    Ok(next)
}

/// Puts a failed event back in the queue with a clean failure count.
/// Returns `false` if the event was not failed.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on database failure.
pub fn requeue(
    conn: &Connection,
    event_id: &str,
    import_kind: &str,
    now: DateTime<Utc>,
) -> Result<bool, TrackerError> {
    match transition(conn, event_id, import_kind, EventState::Pending) {
        Ok(_) => {}
        Err(TrackerError::InvalidTransition { from, .. }) => {
            log::warn!("Event {event_id}: not requeued, state is {from}");
            return Ok(false);
        }
        Err(e) => return Err(e),
    }

    conn.execute(
        "UPDATE event_import_status SET state = ?, attempts = 0, last_error = NULL, updated_at = ?
         WHERE event_id = ? AND import_kind = ?",
        duckdb::params![
            EventState::Pending.to_string(),
            timestamp_to_text(now),
            event_id,
            import_kind
        ],
    )?;
    log::info!("Event {event_id}: requeued");
    Ok(true)
}

/// Events that have been given up on.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on database failure.
pub fn permanently_failed(
    conn: &Connection,
    import_kind: &str,
) -> Result<Vec<EventImportStatus>, TrackerError> {
    query(
        conn,
        &format!("{SELECT_COLUMNS} WHERE import_kind = ? AND state = ? ORDER BY event_id"),
        duckdb::params![import_kind, EventState::PermanentlyFailed.to_string()],
    )
}

/// Every tracked event of a week.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on database failure.
pub fn list(
    conn: &Connection,
    season: i32,
    season_type: SeasonType,
    week: Week,
    import_kind: &str,
) -> Result<Vec<EventImportStatus>, TrackerError> {
    query(
        conn,
        &format!(
            "{SELECT_COLUMNS} WHERE season = ? AND season_type = ? AND week = ? AND import_kind = ?
             ORDER BY event_id"
        ),
        duckdb::params![season, season_type.to_string(), week.to_string(), import_kind],
    )
}

fn query(
    conn: &Connection,
    sql: &str,
    params: &[&dyn duckdb::ToSql],
) -> Result<Vec<EventImportStatus>, TrackerError> {
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<StatusRow> = stmt.query_map(params, read_row)?.collect::<Result<_, _>>()?;
    Ok(rows
        .into_iter()
        .map(into_status)
        .collect::<Result<_, _>>()?)
}
