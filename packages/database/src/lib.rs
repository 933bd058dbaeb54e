#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` store for loaded box scores and ingest bookkeeping.
//!
//! A single database file holds the relational load state (`teams`,
//! `players`, `player_aliases`, `events`, `entity_event_stats`) and the
//! run bookkeeping (`batch_import_status`, `event_import_status`).
//! Every function takes an explicit [`Connection`]; there is no global
//! connection state.

pub mod batch;
pub mod loader;
pub mod paths;
pub mod resolver;
pub mod roster;
pub mod tracker;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::Connection;

/// Version written to `_meta.schema_version`.
pub const SCHEMA_VERSION: &str = "1";

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value has an unexpected shape.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Opens (or creates) the database file and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    log::debug!("Opened {}", path.display());
    Ok(conn)
}

/// Opens a throwaway in-memory database with the full schema.
///
/// # Errors
///
/// Returns [`DbError`] if schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS teams_id_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS players_id_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS events_id_seq START 1;

        CREATE TABLE IF NOT EXISTS teams (
            id BIGINT PRIMARY KEY DEFAULT nextval('teams_id_seq'),
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS players (
            id BIGINT PRIMARY KEY DEFAULT nextval('players_id_seq'),
            display_name TEXT NOT NULL,
            team_id BIGINT NOT NULL,
            jersey TEXT,
            position TEXT NOT NULL,
            created_from TEXT
        );

        CREATE TABLE IF NOT EXISTS player_aliases (
            alias TEXT NOT NULL,
            team_id BIGINT NOT NULL,
            player_id BIGINT NOT NULL,
            PRIMARY KEY (alias, team_id)
        );

        CREATE TABLE IF NOT EXISTS events (
            id BIGINT PRIMARY KEY DEFAULT nextval('events_id_seq'),
            external_id TEXT NOT NULL UNIQUE,
            season INTEGER NOT NULL,
            season_type TEXT NOT NULL,
            week TEXT NOT NULL,
            event_date TEXT,
            home_team_id BIGINT NOT NULL,
            away_team_id BIGINT NOT NULL,
            home_score BIGINT,
            away_score BIGINT
        );

        CREATE TABLE IF NOT EXISTS entity_event_stats (
            entity_kind TEXT NOT NULL,
            entity_id BIGINT NOT NULL,
            event_id BIGINT NOT NULL,
            category TEXT NOT NULL,
            team_id BIGINT NOT NULL,
            fields TEXT NOT NULL,
            PRIMARY KEY (entity_kind, entity_id, event_id, category)
        );

        CREATE TABLE IF NOT EXISTS batch_import_status (
            season INTEGER NOT NULL,
            season_type TEXT NOT NULL,
            week TEXT NOT NULL,
            import_kind TEXT NOT NULL,
            status TEXT NOT NULL,
            processed_count BIGINT NOT NULL DEFAULT 0,
            total_count BIGINT NOT NULL DEFAULT 0,
            started_at TEXT,
            completed_at TEXT,
            error TEXT,
            PRIMARY KEY (season, season_type, week, import_kind)
        );

        CREATE TABLE IF NOT EXISTS event_import_status (
            event_id TEXT NOT NULL,
            import_kind TEXT NOT NULL,
            season INTEGER NOT NULL,
            season_type TEXT NOT NULL,
            week TEXT NOT NULL,
            state TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (event_id, import_kind)
        );

        CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    if get_meta(conn, "schema_version")?.as_deref() != Some(SCHEMA_VERSION) {
        set_meta(conn, "schema_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    match stmt.query_row([key], |row| row.get(0)) {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// Runs `f` inside `BEGIN TRANSACTION` / `COMMIT`, rolling back if it
/// returns an error.
///
/// # Errors
///
/// Returns whatever `f` returns, or a [`DbError`] if the transaction
/// statements themselves fail.
pub fn in_transaction<T, E>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    conn.execute_batch("BEGIN TRANSACTION")
        .map_err(|e| E::from(DbError::DuckDb(e)))?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| E::from(DbError::DuckDb(e)))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::error!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

/// Maps `QueryReturnedNoRows` to `Ok(None)`.
pub(crate) fn optional<T>(result: Result<T, duckdb::Error>) -> Result<Option<T>, duckdb::Error> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

// ── Text encodings for stored timestamps and dates ─────────────────

pub(crate) fn timestamp_to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn text_to_timestamp(text: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Conversion {
            message: format!("bad timestamp {text:?}: {e}"),
        })
}

pub(crate) fn date_to_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn text_to_date(text: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| DbError::Conversion {
        message: format!("bad date {text:?}: {e}"),
    })
}

/// Parses a stored enum/text column through `FromStr`.
pub(crate) fn parse_column<T: std::str::FromStr>(column: &str, text: &str) -> Result<T, DbError> {
    text.parse().map_err(|_| DbError::Conversion {
        message: format!("unexpected {column} value {text:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_records_schema_version() {
        let conn = open_in_memory().unwrap();
        assert_eq!(
            get_meta(&conn, "schema_version").unwrap().as_deref(),
            Some(SCHEMA_VERSION)
        );
        assert_eq!(get_meta(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn reopening_a_file_keeps_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/gridiron.duckdb");
        {
            let conn = open(&path).unwrap();
            set_meta(&conn, "note", "kept").unwrap();
        }
        let conn = open(&path).unwrap();
        assert_eq!(get_meta(&conn, "note").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let conn = open_in_memory().unwrap();
        let result: Result<(), DbError> = in_transaction(&conn, |conn| {
            set_meta(conn, "temp", "value")?;
            Err(DbError::Conversion {
                message: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(get_meta(&conn, "temp").unwrap(), None);

        in_transaction::<_, DbError>(&conn, |conn| set_meta(conn, "temp", "value")).unwrap();
        assert_eq!(get_meta(&conn, "temp").unwrap().as_deref(), Some("value"));
    }
}
