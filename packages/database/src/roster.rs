//! Roster import: seeds `players` with jersey numbers and positions
//! before any box score mentions them.
//!
//! Roster files are CSV with a `team,name,jersey,position,age,...`
//! header. Some scraped rows come out shifted one column to the left:
//! `name` is empty, `position` holds the name with the jersey glued on
//! (`Josh Allen17`), and the real position sits under `age`. Those rows
//! are repaired on read.
//!
//! Roster positions are authoritative and replace whatever the box
//! scores implied.

use std::path::Path;

use duckdb::Connection;
use gridiron_database_models::{CanonicalEntity, UNKNOWN_POSITION};
use serde::Deserialize;

use crate::resolver::{ResolveError, Resolver, find_by_alias, find_by_name};
use crate::{DbError, in_transaction, optional};

/// Provenance written to `players.created_from` for roster-seeded rows.
pub const ROSTER_PROVENANCE: &str = "roster";

/// Errors from roster import.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The roster file could not be read.
    #[error("Failed to read roster {path}: {source}")]
    Csv {
        /// Roster file.
        path: String,
        /// Underlying error.
        source: csv::Error,
    },

    /// Entity resolution failed for a reason other than bad data.
    #[error(transparent)]
    Resolve(ResolveError),
}

impl From<duckdb::Error> for RosterError {
    fn from(e: duckdb::Error) -> Self {
        Self::Db(DbError::DuckDb(e))
    }
}

/// One player on a roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Team label as written in the file.
    pub team: String,
    /// Player name.
    pub name: String,
    /// Jersey number.
    pub jersey: Option<String>,
    /// Position code (`QB`, `WR`, ...).
    pub position: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(default)]
    team: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    jersey: String,
    #[serde(default)]
    position: String,
    #[serde(default)]
    age: String,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn position_code(value: &str) -> Option<String> {
    non_empty(value).filter(|p| !p.eq_ignore_ascii_case("unknown"))
}

/// Splits `Josh Allen17` into `("Josh Allen", Some("17"))`.
fn split_trailing_jersey(value: &str) -> (&str, Option<&str>) {
    let value = value.trim();
    let name = value.trim_end_matches(|c: char| c.is_ascii_digit());
    if name.len() == value.len() || name.trim().is_empty() {
        return (value, None);
    }
    (name.trim(), Some(&value[name.len()..]))
}

impl RosterRow {
    fn to_entry(&self) -> Option<RosterEntry> {
        let team = non_empty(&self.team)?;

        if self.name.trim().is_empty() {
            let (name, jersey) = split_trailing_jersey(&self.position);
            return Some(RosterEntry {
                team,
                name: non_empty(name)?,
                jersey: jersey.map(str::to_string),
                position: position_code(&self.age),
            });
        }

        Some(RosterEntry {
            team,
            name: non_empty(&self.name)?,
            jersey: non_empty(&self.jersey),
            position: position_code(&self.position),
        })
    }
}

/// Reads a roster CSV. Rows without a team or a name are skipped.
///
/// # Errors
///
/// Returns [`RosterError::Csv`] if the file cannot be opened or has no
/// header.
pub fn read_roster(path: &Path) -> Result<Vec<RosterEntry>, RosterError> {
    let csv_error = |source| RosterError::Csv {
        path: path.display().to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(csv_error)?;
    reader.headers().map_err(csv_error)?;

    let mut entries = Vec::new();
    for (line, result) in reader.deserialize::<RosterRow>().enumerate() {
        match result {
            Ok(row) => match row.to_entry() {
                Some(entry) => entries.push(entry),
                None => log::debug!("{}: row {} has no player", path.display(), line + 2),
            },
            Err(e) => log::warn!("{}: skipping malformed row: {e}", path.display()),
        }
    }

    log::info!("Read {} roster entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// What a roster import changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterReport {
    /// Players created from the roster.
    pub inserted: u64,
    /// Existing players whose jersey or position changed.
    pub updated: u64,
    /// Existing players already matching the roster.
    pub unchanged: u64,
    /// Entries with an unknown team or an ambiguous name.
    pub skipped: u64,
}

enum Applied {
    Inserted,
    Updated,
    Unchanged,
}

/// Applies roster entries in one transaction.
///
/// Entries match existing players by name on their team, then by alias.
/// Unmatched entries become new players.
///
/// # Errors
///
/// Returns [`RosterError`] on database failure; nothing is written in
/// that case. Unknown teams and ambiguous names are skipped and counted.
pub fn import_roster(
    conn: &Connection,
    entries: &[RosterEntry],
) -> Result<RosterReport, RosterError> {
    let report = in_transaction(conn, |conn| {
        let mut resolver = Resolver::new();
        let mut report = RosterReport::default();

        for entry in entries {
            let applied = resolver
                .resolve_team(conn, &entry.team, &[])
                .and_then(|team| apply(conn, entry, &team));
            match applied {
                Ok(Applied::Inserted) => report.inserted += 1,
                Ok(Applied::Updated) => report.updated += 1,
                Ok(Applied::Unchanged) => report.unchanged += 1,
                Err(e) if e.is_data_quality() => {
                    log::warn!("Roster {} {}: skipped: {e}", entry.team, entry.name);
                    report.skipped += 1;
                }
                Err(e) => return Err(RosterError::Resolve(e)),
            }
        }
        Ok(report)
    })?;

    log::info!(
        "Roster: {} inserted, {} updated, {} unchanged, {} skipped",
        report.inserted,
        report.updated,
        report.unchanged,
        report.skipped
    );
    Ok(report)
}

fn apply(
    conn: &Connection,
    entry: &RosterEntry,
    team: &CanonicalEntity,
) -> Result<Applied, ResolveError> {
    let jersey = entry.jersey.as_deref();
    let by_name = match find_by_name(conn, &entry.name, None, team) {
        Err(ResolveError::AmbiguousEntity { .. }) if jersey.is_some() => {
            find_by_name(conn, &entry.name, jersey, team)?
        }
        other => other?,
    };
    let existing = match by_name {
        Some(id) => Some(id),
        None => find_by_alias(conn, &entry.name, &entry.name, team.id)?,
    };

    let Some(id) = existing else {
        let position = entry.position.as_deref().unwrap_or(UNKNOWN_POSITION);
        let id: i64 = conn.query_row(
            "INSERT INTO players (display_name, team_id, jersey, position, created_from)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
            duckdb::params![entry.name, team.id, jersey, position, ROSTER_PROVENANCE],
            |row| row.get(0),
        )?;
        log::debug!("Seeded player {id} {:?} ({position})", entry.name);
        return Ok(Applied::Inserted);
    };

    let (old_jersey, old_position): (Option<String>, String) = optional(conn.query_row(
        "SELECT jersey, position FROM players WHERE id = ?",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    ))?
    .ok_or(ResolveError::UnknownPlayer(id))?;

    let new_jersey = entry.jersey.clone().or_else(|| old_jersey.clone());
    let new_position = entry.position.clone().unwrap_or_else(|| old_position.clone());
    if new_jersey == old_jersey && new_position == old_position {
        return Ok(Applied::Unchanged);
    }

    conn.execute(
        "UPDATE players SET jersey = ?, position = ? WHERE id = ?",
        duckdb::params![new_jersey, new_position, id],
    )?;
    log::debug!(
        "Player {id} {:?}: {old_position} -> {new_position}",
        entry.name
    );
    Ok(Applied::Updated)
}
