//! Entity resolution: raw team and player references to canonical rows.
//!
//! Teams resolve through the static franchise table in `gridiron_entity`
//! and get a `teams` row on first sight. Players resolve by exact name on
//! their team, then through `player_aliases`, and are otherwise created
//! with the record that introduced them as provenance.

use std::collections::BTreeMap;

use duckdb::Connection;
use gridiron_database_models::{CanonicalEntity, UNKNOWN_POSITION};
use gridiron_entity::TeamLookupError;
use gridiron_stats_models::{EntityKind, StatCategory, StatRecord};

use crate::{DbError, optional};

/// Errors from entity resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The team label matches no franchise, or more than one.
    #[error(transparent)]
    Team(#[from] TeamLookupError),

    /// More than one canonical entity matches and the record carries
    /// nothing that tells them apart.
    #[error("Ambiguous entity {raw:?} on {team}: {candidates} candidates")]
    AmbiguousEntity {
        /// Raw reference.
        raw: String,
        /// Team used as context.
        team: String,
        /// Number of matching rows.
        candidates: usize,
    },

    /// A player reference with no name.
    #[error("Empty player reference")]
    EmptyReference,

    /// A referenced player id does not exist.
    #[error("Unknown player id {0}")]
    UnknownPlayer(i64),
}

impl From<duckdb::Error> for ResolveError {
    fn from(e: duckdb::Error) -> Self {
        Self::Db(DbError::DuckDb(e))
    }
}

impl ResolveError {
    /// Whether the record should be quarantined rather than failing the
    /// whole load.
    #[must_use]
    pub const fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Self::Team(_) | Self::AmbiguousEntity { .. } | Self::EmptyReference
        )
    }
}

/// Splits a `Name#Jersey` reference. A trailing `#` segment that is not
/// a number is treated as part of the name.
#[must_use]
pub fn split_jersey(raw: &str) -> (&str, Option<&str>) {
    if let Some((name, jersey)) = raw.rsplit_once('#') {
        let jersey = jersey.trim();
        if !jersey.is_empty() && jersey.chars().all(|c| c.is_ascii_digit()) {
            return (name.trim(), Some(jersey));
        }
    }
    (raw.trim(), None)
}

/// Resolves references against one connection. Results are memoized for
/// the resolver's lifetime, so one load sees one answer per reference.
#[derive(Debug, Default)]
pub struct Resolver {
    teams: BTreeMap<String, CanonicalEntity>,
    players: BTreeMap<(i64, String), CanonicalEntity>,
    created_players: u64,
}

impl Resolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Players created by this resolver.
    #[must_use]
    pub const fn created_players(&self) -> u64 {
        self.created_players
    }

    /// Resolves a team label to its `teams` row, creating it on first
    /// sight. `context` holds codes of teams known to be involved.
    ///
    /// # Errors
    ///
    /// * [`ResolveError::Team`] if the label is unknown or ambiguous.
    /// * [`ResolveError::Db`] on database failure.
    pub fn resolve_team(
        &mut self,
        conn: &Connection,
        raw: &str,
        context: &[String],
    ) -> Result<CanonicalEntity, ResolveError> {
        let info = gridiron_entity::lookup_team(raw, context)?;
        if let Some(hit) = self.teams.get(&info.code) {
            return Ok(hit.clone());
        }

        let existing: Option<i64> = optional(conn.query_row(
            "SELECT id FROM teams WHERE code = ?",
            [&info.code],
            |row| row.get(0),
        ))?;

        let id = if let Some(id) = existing {
            id
        } else {
            log::info!("Creating team {} ({})", info.code, info.name);
            conn.query_row(
                "INSERT INTO teams (code, name) VALUES (?, ?) RETURNING id",
                duckdb::params![info.code, info.name],
                |row| row.get(0),
            )?
        };

        let entity = CanonicalEntity {
            id,
            kind: EntityKind::Team,
            display_name: info.name.clone(),
            team_id: Some(id),
            position: None,
        };
        self.teams.insert(info.code.clone(), entity.clone());
        Ok(entity)
    }

    /// Resolves the entity of a record. `team` is the already resolved
    /// team the record belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`]; see [`ResolveError::is_data_quality`] for
    /// which variants are per-record.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        record: &StatRecord,
        team: &CanonicalEntity,
    ) -> Result<CanonicalEntity, ResolveError> {
        match record.entity.kind {
            EntityKind::Team => {
                self.resolve_team(conn, &record.entity.raw, std::slice::from_ref(&record.team))
            }
            EntityKind::Player => self.resolve_player(
                conn,
                &record.entity.raw,
                team,
                record.category,
                &format!("{}:{}", record.event_id, record.entity.raw),
            ),
        }
    }

    /// Resolves a player reference on a team.
    ///
    /// # Errors
    ///
    /// * [`ResolveError::AmbiguousEntity`] when several players share the
    ///   name and no jersey separates them.
    /// * [`ResolveError::EmptyReference`] for a blank name.
    /// * [`ResolveError::Db`] on database failure.
    pub fn resolve_player(
        &mut self,
        conn: &Connection,
        raw: &str,
        team: &CanonicalEntity,
        category: StatCategory,
        provenance: &str,
    ) -> Result<CanonicalEntity, ResolveError> {
        let memo_key = (team.id, raw.to_string());
        if let Some(hit) = self.players.get(&memo_key) {
            return Ok(hit.clone());
        }

        let (name, jersey) = split_jersey(raw);
        if name.is_empty() {
            return Err(ResolveError::EmptyReference);
        }

        let player_id = if let Some(id) = find_by_name(conn, name, jersey, team)? {
            id
        } else if let Some(id) = find_by_alias(conn, raw, name, team.id)? {
            id
        } else {
            self.created_players += 1;
            create_player(conn, name, jersey, team.id, category, provenance)?
        };

        let entity = upgrade_position(conn, player_id, category)?;
        self.players.insert(memo_key, entity.clone());
        Ok(entity)
    }
}

/// Exact `(display_name, team_id)` match, narrowed by jersey.
pub(crate) fn find_by_name(
    conn: &Connection,
    name: &str,
    jersey: Option<&str>,
    team: &CanonicalEntity,
) -> Result<Option<i64>, ResolveError> {
    let mut stmt = conn.prepare(
        "SELECT id, jersey FROM players WHERE display_name = ? AND team_id = ? ORDER BY id",
    )?;
    let candidates: Vec<(i64, Option<String>)> = stmt
        .query_map(duckdb::params![name, team.id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<_, _>>()?;

    let ambiguous = |candidates: usize| ResolveError::AmbiguousEntity {
        raw: jersey.map_or_else(|| name.to_string(), |j| format!("{name}#{j}")),
        team: team.display_name.clone(),
        candidates,
    };

    match jersey {
        Some(jersey) => {
            if let Some((id, _)) = candidates
                .iter()
                .find(|(_, j)| j.as_deref() == Some(jersey))
            {
                return Ok(Some(*id));
            }
            let unnumbered: Vec<i64> = candidates
                .iter()
                .filter(|(_, j)| j.is_none())
                .map(|(id, _)| *id)
                .collect();
            match unnumbered.as_slice() {
                [] => Ok(None),
                [id] => {
                    conn.execute(
                        "UPDATE players SET jersey = ? WHERE id = ?",
                        duckdb::params![jersey, id],
                    )?;
                    Ok(Some(*id))
                }
                many => Err(ambiguous(many.len())),
            }
        }
        None => match candidates.as_slice() {
            [] => Ok(None),
            [(id, _)] => Ok(Some(*id)),
            many => Err(ambiguous(many.len())),
        },
    }
}

/// Known-alias lookup, first on the full raw reference, then on the name.
pub(crate) fn find_by_alias(
    conn: &Connection,
    raw: &str,
    name: &str,
    team_id: i64,
) -> Result<Option<i64>, ResolveError> {
    let mut stmt =
        conn.prepare("SELECT player_id FROM player_aliases WHERE alias = ? AND team_id = ?")?;
    for alias in [raw, name] {
        let hit: Option<i64> =
            optional(stmt.query_row(duckdb::params![alias, team_id], |row| row.get(0)))?;
        if hit.is_some() {
            return Ok(hit);
        }
    }
    Ok(None)
}

fn create_player(
    conn: &Connection,
    name: &str,
    jersey: Option<&str>,
    team_id: i64,
    category: StatCategory,
    provenance: &str,
) -> Result<i64, ResolveError> {
    let position = category.implied_position().unwrap_or(UNKNOWN_POSITION);
    let id: i64 = conn.query_row(
        "INSERT INTO players (display_name, team_id, jersey, position, created_from)
         VALUES (?, ?, ?, ?, ?) RETURNING id",
        duckdb::params![name, team_id, jersey, position, provenance],
        |row| row.get(0),
    )?;
    log::info!("Created player {id} {name:?} ({position}) from {provenance}");
    Ok(id)
}

/// Replaces an `UNK` position with the one implied by `category`, and
/// returns the player as a canonical entity.
fn upgrade_position(
    conn: &Connection,
    id: i64,
    category: StatCategory,
) -> Result<CanonicalEntity, ResolveError> {
    let (display_name, team_id, mut position): (String, i64, String) = optional(conn.query_row(
        "SELECT display_name, team_id, position FROM players WHERE id = ?",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    ))?
    .ok_or(ResolveError::UnknownPlayer(id))?;

    if position == UNKNOWN_POSITION
        && let Some(implied) = category.implied_position()
    {
        conn.execute(
            "UPDATE players SET position = ? WHERE id = ?",
            duckdb::params![implied, id],
        )?;
        position = implied.to_string();
    }

    Ok(CanonicalEntity {
        id,
        kind: EntityKind::Player,
        display_name,
        team_id: Some(team_id),
        position: Some(position),
    })
}

/// Records `alias` as another name for `player_id` on team `team_code`.
///
/// # Errors
///
/// * [`ResolveError::Team`] if the code is not a franchise.
/// * [`ResolveError::UnknownPlayer`] if the player does not exist.
/// * [`ResolveError::Db`] on database failure.
pub fn add_player_alias(
    conn: &Connection,
    team_code: &str,
    alias: &str,
    player_id: i64,
) -> Result<(), ResolveError> {
    let team = Resolver::new().resolve_team(conn, team_code, &[])?;

    let exists: Option<i64> = optional(conn.query_row(
        "SELECT id FROM players WHERE id = ?",
        [player_id],
        |row| row.get(0),
    ))?;
    if exists.is_none() {
        return Err(ResolveError::UnknownPlayer(player_id));
    }

    conn.execute(
        "INSERT INTO player_aliases (alias, team_id, player_id) VALUES (?, ?, ?)
         ON CONFLICT (alias, team_id) DO UPDATE SET player_id = EXCLUDED.player_id",
        duckdb::params![alias.trim(), team.id, player_id],
    )?;
    log::info!("Alias {alias:?} on {team_code} now points at player {player_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use gridiron_stats_models::{EntityRef, StatFields};

    use super::*;
    use crate::open_in_memory;

    fn record(raw: &str, team: &str, category: StatCategory) -> StatRecord {
        StatRecord {
            event_id: "401".to_string(),
            entity: EntityRef::player(raw),
            team: team.to_string(),
            source_team: team.to_string(),
            category,
            fields: StatFields::new(),
        }
    }

    #[test]
    fn splits_jersey_suffix() {
        assert_eq!(split_jersey("Patrick Mahomes#15"), ("Patrick Mahomes", Some("15")));
        assert_eq!(split_jersey("Patrick Mahomes"), ("Patrick Mahomes", None));
        assert_eq!(split_jersey("Odd#Name"), ("Odd#Name", None));
    }

    #[test]
    fn team_labels_share_one_row() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let a = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        let b = Resolver::new().resolve_team(&conn, "Kansas City Chiefs", &[]).unwrap();
        let c = Resolver::new().resolve_team(&conn, "KAN", &[]).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, c.id);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn metro_label_needs_context() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        assert!(matches!(
            resolver.resolve_team(&conn, "New York", &[]),
            Err(ResolveError::Team(TeamLookupError::Ambiguous { .. }))
        ));
        let jets = resolver
            .resolve_team(&conn, "New York", &["NYJ".to_string(), "BUF".to_string()])
            .unwrap();
        assert_eq!(jets.display_name, "New York Jets");
    }

    #[test]
    fn resolving_twice_yields_same_player() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let team = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        let rec = record("Patrick Mahomes#15", "KC", StatCategory::Passing);

        let first = resolver.resolve(&conn, &rec, &team).unwrap();
        let second = resolver.resolve(&conn, &rec, &team).unwrap();
        let fresh = Resolver::new().resolve(&conn, &rec, &team).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, fresh.id);
        assert_eq!(first.position.as_deref(), Some("QB"));
        assert_eq!(resolver.created_players(), 1);
    }

    #[test]
    fn created_player_records_provenance() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let team = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        let player = resolver
            .resolve(&conn, &record("Rashee Rice#4", "KC", StatCategory::Receiving), &team)
            .unwrap();

        let (jersey, created_from): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT jersey, created_from FROM players WHERE id = ?",
                [player.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(jersey.as_deref(), Some("4"));
        assert_eq!(created_from.as_deref(), Some("401:Rashee Rice#4"));
    }

    #[test]
    fn same_name_on_different_teams_are_different_players() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let kc = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        let buf = resolver.resolve_team(&conn, "BUF", &[]).unwrap();

        let a = resolver
            .resolve(&conn, &record("Josh Allen", "KC", StatCategory::Defensive), &kc)
            .unwrap();
        let b = resolver
            .resolve(&conn, &record("Josh Allen", "BUF", StatCategory::Passing), &buf)
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn same_name_same_team_without_jersey_is_ambiguous() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let team = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        resolver
            .resolve(&conn, &record("Chris Jones#95", "KC", StatCategory::Defensive), &team)
            .unwrap();
        resolver
            .resolve(&conn, &record("Chris Jones#12", "KC", StatCategory::Receiving), &team)
            .unwrap();

        let err = Resolver::new()
            .resolve(&conn, &record("Chris Jones", "KC", StatCategory::Defensive), &team)
            .unwrap_err();
        assert!(matches!(err, ResolveError::AmbiguousEntity { candidates: 2, .. }));
        assert!(err.is_data_quality());
    }

    #[test]
    fn alias_table_maps_variant_spelling() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let team = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        let hollywood = resolver
            .resolve(&conn, &record("Marquise Brown", "KC", StatCategory::Receiving), &team)
            .unwrap();

        add_player_alias(&conn, "KC", "Hollywood Brown", hollywood.id).unwrap();
        let aliased = Resolver::new()
            .resolve(&conn, &record("Hollywood Brown", "KC", StatCategory::Receiving), &team)
            .unwrap();
        assert_eq!(aliased.id, hollywood.id);

        assert!(matches!(
            add_player_alias(&conn, "KC", "Nobody", 9_999),
            Err(ResolveError::UnknownPlayer(9_999))
        ));
    }

    #[test]
    fn unknown_position_is_upgraded_by_category() {
        let conn = open_in_memory().unwrap();
        let mut resolver = Resolver::new();
        let team = resolver.resolve_team(&conn, "KC", &[]).unwrap();
        conn.execute(
            "INSERT INTO players (display_name, team_id, position)
             VALUES ('Harrison Butker', ?, 'UNK')",
            [team.id],
        )
        .unwrap();

        let kicker = resolver
            .resolve(&conn, &record("Harrison Butker", "KC", StatCategory::Kicking), &team)
            .unwrap();
        assert_eq!(kicker.position.as_deref(), Some("K"));

        let later = Resolver::new()
            .resolve(&conn, &record("Harrison Butker", "KC", StatCategory::Punting), &team)
            .unwrap();
        assert_eq!(later.position.as_deref(), Some("K"));
    }
}
