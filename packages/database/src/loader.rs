//! Transactional loading of one event's records.
//!
//! Each event loads inside a single transaction: teams and players are
//! resolved, the `events` row is upserted, every stat line is merged into
//! `entity_event_stats`, and the event's scores are recomputed. Any
//! failure rolls the whole event back.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use duckdb::Connection;
use gridiron_database_models::{CanonicalEntity, EntityEventStat, Event, LoadReport};
use gridiron_entity::canonical_code;
use gridiron_stats_models::{
    EntityKind, EventRef, FieldValue, Quarantined, SeasonType, StatCategory, StatFields,
    StatRecord, Week,
};

use crate::resolver::{ResolveError, Resolver};
use crate::{DbError, date_to_text, in_transaction, optional, parse_column, text_to_date};

/// Errors that abort an event's load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Entity resolution failed for a reason other than data quality.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Fewer than two teams could be identified.
    #[error("Event {event_id}: {found} resolvable teams, need home and away")]
    MissingTeams {
        /// Source event id.
        event_id: String,
        /// Teams found.
        found: usize,
    },
}

impl From<duckdb::Error> for LoadError {
    fn from(e: duckdb::Error) -> Self {
        Self::Db(DbError::DuckDb(e))
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(e: serde_json::Error) -> Self {
        Self::Db(DbError::Json(e))
    }
}

/// How a stat row was affected by a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Inserted,
    Updated,
    Unchanged,
}

/// Score line of one event after recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreLine {
    /// Source event id.
    pub event_id: String,
    /// Home points.
    pub home_score: Option<i64>,
    /// Away points.
    pub away_score: Option<i64>,
    /// Whether the stored scores changed.
    pub changed: bool,
}

/// Loads an event, folding any failure into [`LoadReport::error`].
#[must_use]
pub fn load(
    conn: &Connection,
    event: &EventRef,
    event_date: Option<NaiveDate>,
    records: &[StatRecord],
) -> LoadReport {
    match try_load(conn, event, event_date, records) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Event {}: load rolled back: {e}", event.id);
            LoadReport {
                event_id: event.id.clone(),
                error: Some(e.to_string()),
                ..LoadReport::default()
            }
        }
    }
}

/// Loads an event in one transaction.
///
/// Records whose team or entity cannot be resolved unambiguously are not
/// loaded; they come back in [`LoadReport::quarantined`] and the rest of
/// the event still commits.
///
/// # Errors
///
/// Returns [`LoadError`] if the event cannot be loaded; nothing is
/// written in that case.
pub fn try_load(
    conn: &Connection,
    event: &EventRef,
    event_date: Option<NaiveDate>,
    records: &[StatRecord],
) -> Result<LoadReport, LoadError> {
    let report = in_transaction(conn, |conn| {
        load_in_transaction(conn, event, event_date, records)
    })?;
    log::info!(
        "Event {}: {} inserted, {} updated, {} unchanged, {} quarantined, {} new players",
        event.id,
        report.inserted,
        report.updated,
        report.unchanged,
        report.quarantined.len(),
        report.players_created
    );
    Ok(report)
}

fn load_in_transaction(
    conn: &Connection,
    event: &EventRef,
    event_date: Option<NaiveDate>,
    records: &[StatRecord],
) -> Result<LoadReport, LoadError> {
    let mut resolver = Resolver::new();

    let (away_code, home_code) = sides(event, records)?;
    let context = vec![away_code.clone(), home_code.clone()];
    let away = resolver.resolve_team(conn, &away_code, &context)?;
    let home = resolver.resolve_team(conn, &home_code, &context)?;

    let event_row_id = upsert_event(conn, event, event_date, home.id, away.id)?;
    let mut report = LoadReport {
        event_id: event.id.clone(),
        event_row_id: Some(event_row_id),
        ..LoadReport::default()
    };

    for record in records {
        let resolved = resolver
            .resolve_team(conn, &record.team, &context)
            .and_then(|team| Ok((resolver.resolve(conn, record, &team)?, team)));

        let (entity, team) = match resolved {
            Ok(pair) => pair,
            Err(e) if e.is_data_quality() => {
                log::warn!("Event {}: quarantining {}: {e}", event.id, record.entity);
                report.quarantined.push(Quarantined::from_record(record, e.to_string()));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match upsert_stat(conn, &entity, event_row_id, team.id, record)? {
            Upsert::Inserted => report.inserted += 1,
            Upsert::Updated => report.updated += 1,
            Upsert::Unchanged => report.unchanged += 1,
        }
    }

    let line = apply_scores(conn, event_row_id, &event.id, home.id, away.id)?;
    report.home_score = line.home_score;
    report.away_score = line.away_score;
    report.players_created = resolver.created_players();
    Ok(report)
}

/// Picks `(away, home)` team codes: the schedule matchup first, then the
/// scoreboard sides, then page order.
fn sides(event: &EventRef, records: &[StatRecord]) -> Result<(String, String), LoadError> {
    let mut codes: Vec<String> = Vec::new();
    for record in records {
        if !codes.contains(&record.team) {
            codes.push(record.team.clone());
        }
    }

    if let Some(matchup) = &event.matchup
        && let Ok(away) = canonical_code(&matchup.away, &codes)
        && let Ok(home) = canonical_code(&matchup.home, &codes)
        && away != home
    {
        return Ok((away.to_string(), home.to_string()));
    }

    let side_of = |side: &str| {
        records
            .iter()
            .find(|r| {
                r.category == StatCategory::Scoring
                    && r.fields.get("side").and_then(FieldValue::as_str) == Some(side)
            })
            .map(|r| r.team.clone())
    };
    if let (Some(away), Some(home)) = (side_of("away"), side_of("home"))
        && away != home
    {
        return Ok((away, home));
    }

    match codes.as_slice() {
        [away, home, ..] => Ok((away.clone(), home.clone())),
        _ => Err(LoadError::MissingTeams {
            event_id: event.id.clone(),
            found: codes.len(),
        }),
    }
}

fn upsert_event(
    conn: &Connection,
    event: &EventRef,
    event_date: Option<NaiveDate>,
    home_team_id: i64,
    away_team_id: i64,
) -> Result<i64, LoadError> {
    let date = event_date.or_else(|| event.date()).map(date_to_text);
    let season_type = event.season_type.to_string();
    let week = event.week.to_string();

    let existing: Option<(i64, Option<String>, i64, i64, String, String)> = optional(conn.query_row(
        "SELECT id, event_date, home_team_id, away_team_id, season_type, week
         FROM events WHERE external_id = ?",
        [&event.id],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        },
    ))?;

    let Some((id, old_date, old_home, old_away, old_type, old_week)) = existing else {
        let id: i64 = conn.query_row(
            "INSERT INTO events (external_id, season, season_type, week, event_date,
                                 home_team_id, away_team_id)
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            duckdb::params![
                event.id,
                event.season,
                season_type,
                week,
                date,
                home_team_id,
                away_team_id
            ],
            |row| row.get(0),
        )?;
        log::debug!("Event {}: created row {id}", event.id);
        return Ok(id);
    };

    let date = date.or(old_date.clone());
    if date != old_date
        || home_team_id != old_home
        || away_team_id != old_away
        || season_type != old_type
        || week != old_week
    {
        conn.execute(
            "UPDATE events SET season = ?, season_type = ?, week = ?, event_date = ?,
                               home_team_id = ?, away_team_id = ?
             WHERE id = ?",
            duckdb::params![
                event.season,
                season_type,
                week,
                date,
                home_team_id,
                away_team_id,
                id
            ],
        )?;
    }
    Ok(id)
}

/// Merges a record into its stat row. New values overwrite old ones;
/// columns the record lacks keep their stored value.
fn upsert_stat(
    conn: &Connection,
    entity: &CanonicalEntity,
    event_row_id: i64,
    team_id: i64,
    record: &StatRecord,
) -> Result<Upsert, LoadError> {
    let kind = entity.kind.to_string();
    let category = record.category.to_string();

    let existing: Option<(i64, String)> = optional(conn.query_row(
        "SELECT team_id, fields FROM entity_event_stats
         WHERE entity_kind = ? AND entity_id = ? AND event_id = ? AND category = ?",
        duckdb::params![kind, entity.id, event_row_id, category],
        |row| Ok((row.get(0)?, row.get(1)?)),
    ))?;

    let Some((old_team, old_json)) = existing else {
        conn.execute(
            "INSERT INTO entity_event_stats
                 (entity_kind, entity_id, event_id, category, team_id, fields)
             VALUES (?, ?, ?, ?, ?, ?)",
            duckdb::params![
                kind,
                entity.id,
                event_row_id,
                category,
                team_id,
                serde_json::to_string(&record.fields)?
            ],
        )?;
        return Ok(Upsert::Inserted);
    };

    let old: StatFields = serde_json::from_str(&old_json)?;
    let mut merged = old.clone();
    merged.extend(record.fields.clone());
    if merged == old && old_team == team_id {
        return Ok(Upsert::Unchanged);
    }

    conn.execute(
        "UPDATE entity_event_stats SET team_id = ?, fields = ?
         WHERE entity_kind = ? AND entity_id = ? AND event_id = ? AND category = ?",
        duckdb::params![
            team_id,
            serde_json::to_string(&merged)?,
            kind,
            entity.id,
            event_row_id,
            category
        ],
    )?;
    Ok(Upsert::Updated)
}

// ── Scores ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tally {
    reported: Option<i64>,
    derived: i64,
    rows: usize,
}

impl Tally {
    fn score(&self) -> Option<i64> {
        self.reported
            .or_else(|| (self.rows > 0).then_some(self.derived))
    }
}

fn field(fields: &StatFields, name: &str) -> i64 {
    fields.get(name).and_then(FieldValue::as_i64).unwrap_or(0)
}

/// Points implied by one stat line. Receiving touchdowns are skipped;
/// the passer's line already counts them.
fn implied_points(category: StatCategory, fields: &StatFields) -> i64 {
    match category {
        StatCategory::Passing
        | StatCategory::Rushing
        | StatCategory::Defensive
        | StatCategory::Interceptions
        | StatCategory::KickReturns
        | StatCategory::PuntReturns => 6 * field(fields, "touchdowns"),
        StatCategory::Kicking => 3 * field(fields, "fg_made") + field(fields, "xp_made"),
        StatCategory::Receiving
        | StatCategory::Fumbles
        | StatCategory::Punting
        | StatCategory::Scoring => 0,
    }
}

fn tally_scores(conn: &Connection, event_row_id: i64) -> Result<BTreeMap<i64, Tally>, LoadError> {
    let mut stmt = conn.prepare(
        "SELECT team_id, category, fields FROM entity_event_stats WHERE event_id = ?",
    )?;
    let rows: Vec<(i64, String, String)> = stmt
        .query_map([event_row_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<_, _>>()?;

    let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
    for (team_id, category, fields) in rows {
        let category: StatCategory = parse_column("category", &category)?;
        let fields: StatFields = serde_json::from_str(&fields)?;
        let tally = tallies.entry(team_id).or_default();

        if category == StatCategory::Scoring {
            tally.reported = fields.get("points").and_then(FieldValue::as_i64);
        } else {
            tally.derived += implied_points(category, &fields);
            tally.rows += 1;
        }
    }
    Ok(tallies)
}

fn apply_scores(
    conn: &Connection,
    event_row_id: i64,
    external_id: &str,
    home_team_id: i64,
    away_team_id: i64,
) -> Result<ScoreLine, LoadError> {
    let tallies = tally_scores(conn, event_row_id)?;
    let score = |team_id| tallies.get(&team_id).and_then(Tally::score);
    let (home_score, away_score) = (score(home_team_id), score(away_team_id));

    let (old_home, old_away): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT home_score, away_score FROM events WHERE id = ?",
        [event_row_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let changed = (old_home, old_away) != (home_score, away_score);
    if changed {
        conn.execute(
            "UPDATE events SET home_score = ?, away_score = ? WHERE id = ?",
            duckdb::params![home_score, away_score, event_row_id],
        )?;
        log::debug!("Event {external_id}: score {away_score:?} @ {home_score:?}");
    }

    Ok(ScoreLine {
        event_id: external_id.to_string(),
        home_score,
        away_score,
        changed,
    })
}

/// Recomputes scores for every loaded event of a week.
///
/// # Errors
///
/// Returns [`LoadError`] on database failure; events already updated
/// stay updated.
pub fn recompute_scores(
    conn: &Connection,
    season: i32,
    season_type: SeasonType,
    week: Week,
) -> Result<Vec<ScoreLine>, LoadError> {
    let mut stmt = conn.prepare(
        "SELECT id, external_id, home_team_id, away_team_id FROM events
         WHERE season = ? AND season_type = ? AND week = ?
         ORDER BY external_id",
    )?;
    let events: Vec<(i64, String, i64, i64)> = stmt
        .query_map(
            duckdb::params![season, season_type.to_string(), week.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?
        .collect::<Result<_, _>>()?;

    let mut lines = Vec::with_capacity(events.len());
    for (id, external_id, home, away) in events {
        let line = in_transaction(conn, |conn| apply_scores(conn, id, &external_id, home, away))?;
        lines.push(line);
    }

    log::info!(
        "Recomputed scores for {} events of {season} {season_type} week {week} ({} changed)",
        lines.len(),
        lines.iter().filter(|l| l.changed).count()
    );
    Ok(lines)
}

// ── Read side ───────────────────────────────────────────────────────

/// Fetches an event row by source id.
///
/// # Errors
///
/// Returns [`DbError`] on query failure or an unreadable row.
pub fn get_event(conn: &Connection, external_id: &str) -> Result<Option<Event>, DbError> {
    type Row = (i64, i32, String, String, Option<String>, i64, i64, Option<i64>, Option<i64>);

    let row: Option<Row> = optional(conn.query_row(
        "SELECT id, season, season_type, week, event_date, home_team_id, away_team_id,
                home_score, away_score
         FROM events WHERE external_id = ?",
        [external_id],
        |row| {
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
        },
    ))?;

    row.map(|row| {
        let (id, season, season_type, week, date, home_team_id, away_team_id, home, away) = row;
        Ok(Event {
            id,
            external_id: external_id.to_string(),
            season,
            season_type: parse_column("season_type", &season_type)?,
            week: parse_column("week", &week)?,
            event_date: date.as_deref().map(text_to_date).transpose()?,
            home_team_id,
            away_team_id,
            home_score: home,
            away_score: away,
        })
    })
    .transpose()
}

/// Every stat row of an event, ordered by key.
///
/// # Errors
///
/// Returns [`DbError`] on query failure or an unreadable row.
pub fn event_stats(conn: &Connection, external_id: &str) -> Result<Vec<EntityEventStat>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT s.entity_kind, s.entity_id, s.event_id, s.team_id, s.category, s.fields
         FROM entity_event_stats s JOIN events e ON e.id = s.event_id
         WHERE e.external_id = ?
         ORDER BY s.entity_kind, s.entity_id, s.category",
    )?;
    let rows: Vec<(String, i64, i64, i64, String, String)> = stmt
        .query_map([external_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    rows.into_iter()
        .map(|(kind, entity_id, event_id, team_id, category, fields)| {
            Ok(EntityEventStat {
                entity_kind: parse_column::<EntityKind>("entity_kind", &kind)?,
                entity_id,
                event_id,
                team_id,
                category: parse_column("category", &category)?,
                fields: serde_json::from_str(&fields)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use gridiron_stats_models::{EntityRef, Matchup};

    use super::*;
    use crate::open_in_memory;

    fn event(matchup: Option<(&str, &str)>) -> EventRef {
        EventRef {
            id: "401772936".to_string(),
            url: "https://www.espn.com/nfl/game/_/gameId/401772936".to_string(),
            scheduled_at: None,
            event_date: NaiveDate::from_ymd_opt(2025, 9, 5),
            season: 2025,
            week: Week::Number(1),
            season_type: SeasonType::Regular,
            matchup: matchup.map(|(away, home)| Matchup {
                away: away.to_string(),
                home: home.to_string(),
            }),
        }
    }

    fn player(team: &str, raw: &str, category: StatCategory, fields: &[(&str, i64)]) -> StatRecord {
        StatRecord {
            event_id: "401772936".to_string(),
            entity: EntityRef::player(raw),
            team: team.to_string(),
            source_team: team.to_string(),
            category,
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), FieldValue::Int(*v)))
                .collect(),
        }
    }

    fn scoring(team: &str, side: &str, points: i64) -> StatRecord {
        StatRecord {
            event_id: "401772936".to_string(),
            entity: EntityRef::team(team),
            team: team.to_string(),
            source_team: team.to_string(),
            category: StatCategory::Scoring,
            fields: [
                ("side".to_string(), FieldValue::Text(side.to_string())),
                ("points".to_string(), FieldValue::Int(points)),
            ]
            .into(),
        }
    }

    fn game() -> Vec<StatRecord> {
        vec![
            player(
                "DAL",
                "Dak Prescott#4",
                StatCategory::Passing,
                &[("completions", 23), ("attempts", 34), ("touchdowns", 0)],
            ),
            player(
                "DAL",
                "Brandon Aubrey#17",
                StatCategory::Kicking,
                &[("fg_made", 5), ("xp_made", 0)],
            ),
            player(
                "PHI",
                "Jalen Hurts#1",
                StatCategory::Passing,
                &[("completions", 19), ("attempts", 22), ("touchdowns", 1)],
            ),
            player(
                "PHI",
                "Jalen Hurts#1",
                StatCategory::Rushing,
                &[("attempts", 14), ("touchdowns", 2)],
            ),
            player(
                "PHI",
                "Saquon Barkley#26",
                StatCategory::Rushing,
                &[("attempts", 18), ("touchdowns", 1)],
            ),
            player(
                "PHI",
                "Jake Elliott#4",
                StatCategory::Kicking,
                &[("fg_made", 0), ("xp_made", 4)],
            ),
            player(
                "PHI",
                "A.J. Brown#11",
                StatCategory::Receiving,
                &[("receptions", 1), ("touchdowns", 1)],
            ),
        ]
    }

    fn stat_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM entity_event_stats", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn first_load_creates_event_and_derives_scores() {
        let conn = open_in_memory().unwrap();
        let report = try_load(&conn, &event(Some(("DAL", "PHI"))), None, &game()).unwrap();

        assert_eq!(report.inserted, 7);
        assert_eq!(report.players_created, 6);
        assert!(report.quarantined.is_empty());

        let row = get_event(&conn, "401772936").unwrap().unwrap();
        assert_eq!(row.event_date, NaiveDate::from_ymd_opt(2025, 9, 5));
        assert_eq!(row.home_score, Some(28));
        assert_eq!(row.away_score, Some(15));
    }

    #[test]
    fn reported_points_win_over_derived() {
        let conn = open_in_memory().unwrap();
        let mut records = game();
        records.push(scoring("DAL", "away", 20));
        records.push(scoring("PHI", "home", 24));

        let report = try_load(&conn, &event(None), None, &records).unwrap();
        assert_eq!((report.away_score, report.home_score), (Some(20), Some(24)));

        let row = get_event(&conn, "401772936").unwrap().unwrap();
        let (home_code, away_code): (String, String) = conn
            .query_row(
                "SELECT h.code, a.code FROM events e
                 JOIN teams h ON h.id = e.home_team_id JOIN teams a ON a.id = e.away_team_id
                 WHERE e.id = ?",
                [row.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((away_code.as_str(), home_code.as_str()), ("DAL", "PHI"));
    }

    #[test]
    fn reloading_identical_records_changes_nothing() {
        let conn = open_in_memory().unwrap();
        let ev = event(Some(("DAL", "PHI")));
        try_load(&conn, &ev, None, &game()).unwrap();
        let before = event_stats(&conn, "401772936").unwrap();

        let report = try_load(&conn, &ev, None, &game()).unwrap();
        assert!(!report.changed());
        assert_eq!(report.unchanged, 7);
        assert_eq!(report.players_created, 0);
        assert_eq!(event_stats(&conn, "401772936").unwrap(), before);
        assert_eq!(stat_count(&conn), 7);
    }

    #[test]
    fn corrected_refetch_merges_into_one_row() {
        let conn = open_in_memory().unwrap();
        let ev = event(Some(("DAL", "PHI")));
        let first = vec![
            player(
                "DAL",
                "Dak Prescott#4",
                StatCategory::Passing,
                &[("attempts", 30), ("completions", 20)],
            ),
            player("PHI", "Jalen Hurts#1", StatCategory::Passing, &[("attempts", 22)]),
        ];
        let second = vec![
            player("DAL", "Dak Prescott#4", StatCategory::Passing, &[("completions", 22)]),
            player("PHI", "Jalen Hurts#1", StatCategory::Passing, &[("attempts", 22)]),
        ];

        try_load(&conn, &ev, None, &first).unwrap();
        let report = try_load(&conn, &ev, None, &second).unwrap();
        assert_eq!((report.updated, report.unchanged), (1, 1));

        let stats = event_stats(&conn, "401772936").unwrap();
        assert_eq!(stats.len(), 2);
        let dak = stats
            .iter()
            .find(|s| s.fields.get("attempts") == Some(&FieldValue::Int(30)))
            .unwrap();
        assert_eq!(dak.fields["completions"], FieldValue::Int(22));
    }

    #[test]
    fn ambiguous_player_is_quarantined_and_rest_commits() {
        let conn = open_in_memory().unwrap();
        let ev = event(Some(("DAL", "PHI")));
        try_load(
            &conn,
            &ev,
            None,
            &[
                player("PHI", "Josh Sweat#94", StatCategory::Defensive, &[("tackles", 3)]),
                player("PHI", "Josh Sweat#19", StatCategory::Receiving, &[("receptions", 1)]),
            ],
        )
        .unwrap();

        let report = try_load(
            &conn,
            &ev,
            None,
            &[
                player("PHI", "Josh Sweat", StatCategory::Defensive, &[("tackles", 4)]),
                player("DAL", "Micah Parsons#11", StatCategory::Defensive, &[("sacks", 1)]),
            ],
        )
        .unwrap();

        assert_eq!(report.quarantined.len(), 1);
        assert_eq!(report.quarantined[0].entity.raw, "Josh Sweat");
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn one_team_fails_and_rolls_back() {
        let conn = open_in_memory().unwrap();
        let dak = player("DAL", "Dak Prescott#4", StatCategory::Passing, &[("attempts", 30)]);
        let records = vec![dak];

        let report = load(&conn, &event(None), None, &records);
        assert!(report.error.unwrap().contains("need home and away"));
        assert_eq!(get_event(&conn, "401772936").unwrap(), None);
        let teams: i64 = conn
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(teams, 0);
    }

    #[test]
    fn recompute_restores_scores_for_the_week() {
        let conn = open_in_memory().unwrap();
        try_load(&conn, &event(Some(("DAL", "PHI"))), None, &game()).unwrap();
        conn.execute("UPDATE events SET home_score = 0, away_score = 0", [])
            .unwrap();

        let lines = recompute_scores(&conn, 2025, SeasonType::Regular, Week::Number(1)).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].changed);
        assert_eq!((lines[0].away_score, lines[0].home_score), (Some(15), Some(28)));

        let again = recompute_scores(&conn, 2025, SeasonType::Regular, Week::Number(1)).unwrap();
        assert!(!again[0].changed);
    }
}
