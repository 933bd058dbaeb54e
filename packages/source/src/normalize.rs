//! Turns extracted page sections into [`StatRecord`]s.
//!
//! Team labels are resolved to canonical codes through the shared
//! franchise table, using the event's own teams as context for shared
//! metro labels. Sections whose team cannot be resolved are quarantined
//! rather than guessed.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use gridiron_entity::canonical_code;
use gridiron_stats_models::{
    EntityRef, EventRef, FieldValue, Quarantined, StatCategory, StatFields, StatRecord,
};

use crate::{ExtractedEvent, StatSection};

/// Normalized output for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Game date from the page, falling back to the schedule.
    pub event_date: Option<NaiveDate>,
    /// Records ready for staging.
    pub records: Vec<StatRecord>,
    /// Records that could not be attributed to a team.
    pub quarantined: Vec<Quarantined>,
}

/// Canonical codes of the teams known to play in this event.
fn context_codes(event: &EventRef, extracted: &ExtractedEvent) -> Vec<String> {
    let mut labels: Vec<&str> = Vec::new();
    if let Some(matchup) = &event.matchup {
        labels.push(&matchup.away);
        labels.push(&matchup.home);
    }
    labels.extend(extracted.scoreboard.iter().map(|s| s.source_team.as_str()));
    labels.extend(extracted.sections.iter().map(|s| s.source_team.as_str()));

    let mut codes: Vec<String> = Vec::new();
    for label in labels {
        if let Ok(code) = canonical_code(label, &[]) {
            if !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
    }
    codes
}

/// Resolves teams and flattens an [`ExtractedEvent`] into records.
#[must_use]
pub fn normalize(event: &EventRef, extracted: ExtractedEvent) -> Extraction {
    let context = context_codes(event, &extracted);
    let mut out = Extraction {
        event_date: extracted.event_date.or_else(|| event.date()),
        ..Extraction::default()
    };

    for section in extracted.sections {
        match canonical_code(&section.source_team, &context) {
            Ok(code) => out.records.extend(section_records(event, code, section)),
            Err(e) => {
                log::warn!(
                    "Event {}: quarantining {} {}: {e}",
                    event.id,
                    section.source_team,
                    section.category
                );
                out.quarantined.extend(section.rows.into_iter().map(|(entity, fields)| {
                    Quarantined {
                        event_id: event.id.clone(),
                        entity,
                        source_team: section.source_team.clone(),
                        team: None,
                        category: section.category,
                        fields,
                        reason: e.to_string(),
                    }
                }));
            }
        }
    }

    for score in extracted.scoreboard {
        let mut fields = StatFields::new();
        fields.insert("side".to_string(), FieldValue::Text(score.side.to_string()));
        if let Some(points) = score.points {
            fields.insert("points".to_string(), FieldValue::Int(points));
        }

        match canonical_code(&score.source_team, &context) {
            Ok(code) => out.records.push(StatRecord {
                event_id: event.id.clone(),
                entity: EntityRef::team(code),
                team: code.to_string(),
                source_team: score.source_team,
                category: StatCategory::Scoring,
                fields,
            }),
            Err(e) => {
                log::warn!("Event {}: quarantining scoreboard line: {e}", event.id);
                out.quarantined.push(Quarantined {
                    event_id: event.id.clone(),
                    entity: EntityRef::team(score.source_team.clone()),
                    source_team: score.source_team,
                    team: None,
                    category: StatCategory::Scoring,
                    fields,
                    reason: e.to_string(),
                });
            }
        }
    }

    out
}

/// Converts one section's rows, keeping the last row for any entity that
/// appears twice.
fn section_records(event: &EventRef, code: &str, section: StatSection) -> Vec<StatRecord> {
    let total = section.rows.len();
    let mut last_seen: BTreeMap<EntityRef, usize> = BTreeMap::new();
    for (i, (entity, _)) in section.rows.iter().enumerate() {
        last_seen.insert(entity.clone(), i);
    }

    let records: Vec<StatRecord> = section
        .rows
        .into_iter()
        .enumerate()
        .filter(|(i, (entity, _))| last_seen.get(entity) == Some(i))
        .map(|(_, (entity, fields))| StatRecord {
            event_id: event.id.clone(),
            entity,
            team: code.to_string(),
            source_team: section.source_team.clone(),
            category: section.category,
            fields,
        })
        .collect();

    if records.len() < total {
        log::info!(
            "Event {}: {code} {}: {} duplicate rows removed",
            event.id,
            section.category,
            total - records.len()
        );
    }

    records
}

#[cfg(test)]
mod tests {
    use gridiron_stats_models::{Matchup, SeasonType, Week};

    use super::*;
    use crate::{Side, TeamScore};

    fn event(matchup: Option<(&str, &str)>) -> EventRef {
        EventRef {
            id: "401".to_string(),
            url: "https://www.espn.com/nfl/game/_/gameId/401".to_string(),
            scheduled_at: None,
            event_date: NaiveDate::from_ymd_opt(2025, 9, 7),
            season: 2025,
            week: Week::Number(1),
            season_type: SeasonType::Regular,
            matchup: matchup.map(|(away, home)| Matchup {
                away: away.to_string(),
                home: home.to_string(),
            }),
        }
    }

    fn fields(pairs: &[(&str, i64)]) -> StatFields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), FieldValue::Int(*v)))
            .collect()
    }

    fn section(team: &str, category: StatCategory, players: &[(&str, i64)]) -> StatSection {
        StatSection {
            source_team: team.to_string(),
            category,
            rows: players
                .iter()
                .map(|(name, yards)| (EntityRef::player(*name), fields(&[("yards", *yards)])))
                .collect(),
        }
    }

    #[test]
    fn resolves_teams_and_builds_records() {
        let extracted = ExtractedEvent {
            event_date: None,
            scoreboard: vec![TeamScore {
                source_team: "Bills".to_string(),
                side: Side::Home,
                points: Some(41),
            }],
            sections: vec![section(
                "Buffalo Bills",
                StatCategory::Rushing,
                &[("James Cook", 112)],
            )],
        };
        let out = normalize(&event(None), extracted);

        assert!(out.quarantined.is_empty());
        assert_eq!(out.event_date, NaiveDate::from_ymd_opt(2025, 9, 7));
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].team, "BUF");
        assert_eq!(out.records[0].source_team, "Buffalo Bills");

        let scoring = &out.records[1];
        assert_eq!(scoring.category, StatCategory::Scoring);
        assert_eq!(scoring.entity, EntityRef::team("BUF"));
        assert_eq!(scoring.int("points"), Some(41));
        assert_eq!(scoring.fields["side"], FieldValue::Text("home".to_string()));
    }

    #[test]
    fn metro_label_resolves_from_matchup_context() {
        let extracted = ExtractedEvent {
            sections: vec![section("New York", StatCategory::Passing, &[("Justin Fields", 200)])],
            ..ExtractedEvent::default()
        };
        let out = normalize(&event(Some(("PIT", "NYJ"))), extracted);
        assert_eq!(out.records[0].team, "NYJ");
    }

    #[test]
    fn unresolvable_team_is_quarantined_not_guessed() {
        let extracted = ExtractedEvent {
            sections: vec![section(
                "New York",
                StatCategory::Passing,
                &[("Somebody", 100), ("Backup", 3)],
            )],
            ..ExtractedEvent::default()
        };
        let out = normalize(&event(None), extracted);

        assert!(out.records.is_empty());
        assert_eq!(out.quarantined.len(), 2);
        assert_eq!(out.quarantined[0].team, None);
        assert!(out.quarantined[0].reason.contains("Ambiguous"));
    }

    #[test]
    fn duplicate_rows_keep_last_occurrence() {
        let extracted = ExtractedEvent {
            sections: vec![section(
                "Chiefs",
                StatCategory::Receiving,
                &[("Travis Kelce", 40), ("Rashee Rice", 80), ("Travis Kelce", 55)],
            )],
            ..ExtractedEvent::default()
        };
        let out = normalize(&event(None), extracted);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].entity.raw, "Rashee Rice");
        assert_eq!(out.records[1].int("yards"), Some(55));
    }
}
