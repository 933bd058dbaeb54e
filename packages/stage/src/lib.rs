#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Staging of extracted stats as immutable, deterministically named CSV
//! artifacts.
//!
//! One artifact holds one team's records for one category of one event.
//! Staged files are the checkpoint between fetching and loading: the
//! loader only ever reads what [`Stager::event_artifacts`] returns.
//!
//! Artifacts live under `{staging_dir}/{season}/{season_type}/`;
//! quarantine files under `{quarantine_dir}/{season}/{season_type}/`.

pub mod artifact;
pub mod naming;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use gridiron_stats_models::{EntityRef, EventRef, Quarantined, StatCategory, StatRecord};

pub use naming::ArtifactKey;

/// Errors from staging or reading artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding of quarantined fields failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two different source teams map to the same artifact name.
    #[error("Naming conflict on {file_name}: {existing_source:?} vs {incoming_source:?}")]
    NamingConflict {
        /// The contested artifact name.
        file_name: String,
        /// Source team that already owns the name.
        existing_source: String,
        /// Source team that tried to claim it.
        incoming_source: String,
    },

    /// A file in the staging directory is not a readable artifact.
    #[error("Malformed artifact {path}: {message}")]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },
}

/// A staged artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Natural key encoded in the file name.
    pub key: ArtifactKey,
    /// Location on disk.
    pub path: PathBuf,
    /// Hex SHA-256 of the file contents.
    pub digest: String,
    /// Raw team label the records came from.
    pub source_team: String,
    /// Number of records in the file.
    pub records: usize,
    /// Whether this call wrote the file. `false` means identical content
    /// was already staged.
    pub written: bool,
}

/// Result of staging every record group of one event.
#[derive(Debug, Clone, Default)]
pub struct StagedEvent {
    /// Artifacts now on disk for the event.
    pub artifacts: Vec<Artifact>,
    /// Records withheld because of a naming conflict.
    pub conflicts: Vec<Quarantined>,
}

/// Writes and reads artifacts under fixed staging and quarantine roots.
#[derive(Debug, Clone)]
pub struct Stager {
    staging_dir: PathBuf,
    quarantine_dir: PathBuf,
}

impl Stager {
    /// Creates a stager. Directories are created lazily on first write.
    #[must_use]
    pub fn new(staging_dir: impl Into<PathBuf>, quarantine_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            quarantine_dir: quarantine_dir.into(),
        }
    }

    /// Directory holding artifacts for an event's season and season type.
    #[must_use]
    pub fn artifact_dir(&self, event: &EventRef) -> PathBuf {
        self.staging_dir
            .join(event.season.to_string())
            .join(event.season_type.to_string())
    }

    /// Directory holding quarantine files for an event's season and
    /// season type.
    #[must_use]
    pub fn quarantine_dir(&self, event: &EventRef) -> PathBuf {
        self.quarantine_dir
            .join(event.season.to_string())
            .join(event.season_type.to_string())
    }

    /// Stages one team's records for one category.
    ///
    /// Rerunning with identical records leaves the file untouched;
    /// different records from the same source team overwrite it. An
    /// earlier artifact for the same team, category, and event under a
    /// different date is removed once the new one is written, so each
    /// slot has exactly one file.
    ///
    /// # Errors
    ///
    /// * [`StageError::NamingConflict`] if the slot is already staged
    ///   from a different source team, under any date.
    /// * [`StageError::Io`] / [`StageError::Csv`] on write failure.
    pub fn stage(
        &self,
        event: &EventRef,
        event_date: Option<NaiveDate>,
        team: &str,
        category: StatCategory,
        records: &[StatRecord],
    ) -> Result<Artifact, StageError> {
        let key = ArtifactKey {
            team: team.to_string(),
            category,
            week: event.week,
            event_date,
            event_id: event.id.clone(),
        };
        let source_team = records
            .first()
            .map(|r| r.source_team.clone())
            .unwrap_or_default();

        let dir = self.artifact_dir(event);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(key.file_name());

        let bytes = artifact::encode(category, records)?;
        let digest = artifact::digest(&bytes);

        let mut written = true;
        let mut superseded = Vec::new();
        for (existing_key, existing_path) in self.event_artifacts(event)? {
            if !existing_key.same_slot(&key) {
                continue;
            }
            let existing = std::fs::read(&existing_path)?;
            if let Some(existing_source) = first_source_team(category, &existing, &existing_path)?
                && existing_source != source_team
            {
                return Err(StageError::NamingConflict {
                    file_name: existing_key.file_name(),
                    existing_source,
                    incoming_source: source_team,
                });
            }
            if existing_path == path {
                written = artifact::digest(&existing) != digest;
            } else {
                superseded.push(existing_path);
            }
        }

        if written {
            artifact::write_atomic(&path, &bytes)?;
            log::debug!("Staged {} ({} records)", path.display(), records.len());
        } else {
            log::debug!("Unchanged {}", path.display());
        }
        for stale in superseded {
            std::fs::remove_file(&stale)?;
            log::info!("Removed {}, superseded by {}", stale.display(), path.display());
        }

        Ok(Artifact {
            key,
            path,
            digest,
            source_team,
            records: records.len(),
            written,
        })
    }

    /// Groups an event's records by `(team, category)` and stages each
    /// group.
    ///
    /// A group fed by more than one source team, or one that collides
    /// with a differently sourced file on disk, is not written; its
    /// records come back in [`StagedEvent::conflicts`].
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] on filesystem or encoding failure.
    pub fn stage_event(
        &self,
        event: &EventRef,
        event_date: Option<NaiveDate>,
        records: &[StatRecord],
    ) -> Result<StagedEvent, StageError> {
        let mut groups: BTreeMap<(String, StatCategory), Vec<&StatRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.team.clone(), record.category))
                .or_default()
                .push(record);
        }

        let mut staged = StagedEvent::default();
        for ((team, category), group) in groups {
            let mut sources: Vec<&str> = group.iter().map(|r| r.source_team.as_str()).collect();
            sources.sort_unstable();
            sources.dedup();
            if sources.len() > 1 {
                log::warn!(
                    "Event {}: {team} {category} claimed by {sources:?}; quarantining",
                    event.id
                );
                let reason = format!("Naming conflict: {team} {category} from {sources:?}");
                staged
                    .conflicts
                    .extend(group.iter().map(|r| Quarantined::from_record(r, reason.clone())));
                continue;
            }

            let group = dedup_last(group);
            match self.stage(event, event_date, &team, category, &group) {
                Ok(artifact) => staged.artifacts.push(artifact),
                Err(e @ StageError::NamingConflict { .. }) => {
                    log::warn!("Event {}: {e}", event.id);
                    let reason = e.to_string();
                    staged
                        .conflicts
                        .extend(group.iter().map(|r| Quarantined::from_record(r, reason.clone())));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(staged)
    }

    /// Lists the artifacts staged for an event, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Io`] if the directory cannot be read.
    pub fn event_artifacts(
        &self,
        event: &EventRef,
    ) -> Result<Vec<(ArtifactKey, PathBuf)>, StageError> {
        let dir = self.artifact_dir(event);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(ArtifactKey::parse)
                && key.event_id == event.id
            {
                found.push((key, entry.path()));
            }
        }
        found.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(found)
    }

    /// Writes an event's quarantined records to its quarantine file,
    /// replacing any earlier one. Returns the path, or `None` when there
    /// is nothing to quarantine.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] on filesystem or encoding failure.
    pub fn write_quarantine(
        &self,
        event: &EventRef,
        records: &[Quarantined],
    ) -> Result<Option<PathBuf>, StageError> {
        if records.is_empty() {
            return Ok(None);
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "event_id",
            "entity_kind",
            "entity_ref",
            "team",
            "source_team",
            "category",
            "reason",
            "fields",
        ])?;
        for record in records {
            writer.write_record([
                record.event_id.as_str(),
                record.entity.kind.as_ref(),
                record.entity.raw.as_str(),
                record.team.as_deref().unwrap_or(""),
                record.source_team.as_str(),
                record.category.as_ref(),
                record.reason.as_str(),
                serde_json::to_string(&record.fields)?.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StageError::Io(e.into_error()))?;

        let dir = self.quarantine_dir(event);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(naming::quarantine_file_name(event.week, &event.id));
        artifact::write_atomic(&path, &bytes)?;

        log::warn!(
            "Event {}: {} records quarantined to {}",
            event.id,
            records.len(),
            path.display()
        );
        Ok(Some(path))
    }
}

/// Reads a staged artifact back into records. The category comes from the
/// file name.
///
/// # Errors
///
/// Returns [`StageError::Malformed`] if the name or contents are not an
/// artifact, or [`StageError::Io`] if it cannot be read.
pub fn read_artifact(path: &Path) -> Result<Vec<StatRecord>, StageError> {
    let key = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(ArtifactKey::parse)
        .ok_or_else(|| StageError::Malformed {
            path: path.to_path_buf(),
            message: "not an artifact file name".to_string(),
        })?;
    let bytes = std::fs::read(path)?;
    artifact::decode(key.category, &bytes, path)
}

fn first_source_team(
    category: StatCategory,
    bytes: &[u8],
    path: &Path,
) -> Result<Option<String>, StageError> {
    Ok(artifact::decode(category, bytes, path)?
        .into_iter()
        .next()
        .map(|r| r.source_team))
}

/// Keeps the last record for each entity, preserving first-seen order.
fn dedup_last(group: Vec<&StatRecord>) -> Vec<StatRecord> {
    let mut order: Vec<EntityRef> = Vec::new();
    let mut latest: BTreeMap<EntityRef, StatRecord> = BTreeMap::new();
    for record in group {
        if latest.insert(record.entity.clone(), record.clone()).is_none() {
            order.push(record.entity.clone());
        }
    }
    order
        .into_iter()
        .filter_map(|entity| latest.remove(&entity))
        .collect()
}

#[cfg(test)]
mod tests {
    use gridiron_stats_models::{FieldValue, SeasonType, Week};

    use super::*;

    fn event() -> EventRef {
        EventRef {
            id: "401772936".to_string(),
            url: "https://www.espn.com/nfl/game/_/gameId/401772936".to_string(),
            scheduled_at: None,
            event_date: None,
            season: 2025,
            week: Week::Number(1),
            season_type: SeasonType::Regular,
            matchup: None,
        }
    }

    fn record(team: &str, source: &str, player: &str, yards: i64) -> StatRecord {
        StatRecord {
            event_id: "401772936".to_string(),
            entity: EntityRef::player(player),
            team: team.to_string(),
            source_team: source.to_string(),
            category: StatCategory::Rushing,
            fields: [("yards".to_string(), FieldValue::Int(yards))].into(),
        }
    }

    fn date() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 9, 5)
    }

    #[test]
    fn stages_under_season_directory_with_deterministic_name() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("staging"), tmp.path().join("quarantine"));
        let records = vec![record("KC", "Chiefs", "Isiah Pacheco", 45)];

        let artifact = stager
            .stage(&event(), date(), "KC", StatCategory::Rushing, &records)
            .unwrap();

        assert!(artifact.written);
        assert_eq!(
            artifact.path,
            tmp.path()
                .join("staging/2025/regular/nfl_KC_rushing_week1_20250905_401772936.csv")
        );
        assert_eq!(read_artifact(&artifact.path).unwrap(), records);
    }

    #[test]
    fn identical_rerun_skips_write_and_changed_rerun_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let first = vec![record("KC", "Chiefs", "Isiah Pacheco", 45)];

        let a = stager.stage(&event(), date(), "KC", StatCategory::Rushing, &first).unwrap();
        let b = stager.stage(&event(), date(), "KC", StatCategory::Rushing, &first).unwrap();
        assert!(!b.written);
        assert_eq!(a.digest, b.digest);

        let second = vec![record("KC", "Chiefs", "Isiah Pacheco", 52)];
        let c = stager.stage(&event(), date(), "KC", StatCategory::Rushing, &second).unwrap();
        assert!(c.written);
        assert_ne!(c.digest, a.digest);
        assert_eq!(read_artifact(&c.path).unwrap(), second);
    }

    #[test]
    fn different_source_on_disk_is_a_naming_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let jets = [record("NYJ", "Jets", "Breece Hall", 80)];
        let giants = [record("NYJ", "Giants", "Tyrone Tracy", 60)];
        stager
            .stage(&event(), date(), "NYJ", StatCategory::Rushing, &jets)
            .unwrap();

        let err = stager
            .stage(&event(), date(), "NYJ", StatCategory::Rushing, &giants)
            .unwrap_err();
        assert!(matches!(err, StageError::NamingConflict { .. }));

        let kept = stager.event_artifacts(&event()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(read_artifact(&kept[0].1).unwrap()[0].entity.raw, "Breece Hall");
    }

    #[test]
    fn redated_restage_replaces_the_earlier_file() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let kickoff_date = NaiveDate::from_ymd_opt(2025, 9, 8);
        let page_date = NaiveDate::from_ymd_opt(2025, 9, 7);

        let stale = [record("DAL", "Cowboys", "Javonte Williams", 20)];
        let corrected = [record("DAL", "Cowboys", "Javonte Williams", 22)];

        let first = stager
            .stage(&event(), kickoff_date, "DAL", StatCategory::Rushing, &stale)
            .unwrap();
        let second = stager
            .stage(&event(), page_date, "DAL", StatCategory::Rushing, &corrected)
            .unwrap();

        assert!(second.written);
        assert!(!first.path.exists());
        let found = stager.event_artifacts(&event()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.event_date, page_date);
        let read = read_artifact(&found[0].1).unwrap();
        assert_eq!(read[0].fields["yards"], FieldValue::Int(22));
    }

    #[test]
    fn naming_conflict_is_detected_across_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let jets = [record("NYJ", "Jets", "Breece Hall", 80)];
        let giants = [record("NYJ", "Giants", "Tyrone Tracy", 60)];
        let original = stager
            .stage(&event(), date(), "NYJ", StatCategory::Rushing, &jets)
            .unwrap();

        let other_date = NaiveDate::from_ymd_opt(2025, 9, 6);
        let err = stager
            .stage(&event(), other_date, "NYJ", StatCategory::Rushing, &giants)
            .unwrap_err();

        assert!(matches!(err, StageError::NamingConflict { .. }));
        assert!(original.path.exists());
        assert_eq!(stager.event_artifacts(&event()).unwrap().len(), 1);
    }

    #[test]
    fn stage_event_quarantines_groups_claimed_by_two_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let records = vec![
            record("NYJ", "Jets", "Breece Hall", 80),
            record("NYJ", "New York", "Tyrone Tracy", 60),
            record("PIT", "Steelers", "Jaylen Warren", 55),
        ];

        let staged = stager.stage_event(&event(), date(), &records).unwrap();

        assert_eq!(staged.artifacts.len(), 1);
        assert_eq!(staged.artifacts[0].key.team, "PIT");
        assert_eq!(staged.conflicts.len(), 2);
        assert!(staged.conflicts[0].reason.starts_with("Naming conflict"));
    }

    #[test]
    fn stage_event_keeps_last_duplicate_row() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let records = vec![
            record("KC", "Chiefs", "Isiah Pacheco", 45),
            record("KC", "Chiefs", "Kareem Hunt", 20),
            record("KC", "Chiefs", "Isiah Pacheco", 52),
        ];

        let staged = stager.stage_event(&event(), date(), &records).unwrap();
        let read = read_artifact(&staged.artifacts[0].path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].entity.raw, "Isiah Pacheco");
        assert_eq!(read[0].fields["yards"], FieldValue::Int(52));
    }

    #[test]
    fn event_artifacts_ignores_other_events_and_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        stager
            .stage(&event(), date(), "KC", StatCategory::Rushing, &[record("KC", "Chiefs", "A", 1)])
            .unwrap();
        let mut other = event();
        other.id = "401772937".to_string();
        stager
            .stage(&other, date(), "KC", StatCategory::Rushing, &[record("KC", "Chiefs", "B", 2)])
            .unwrap();
        std::fs::write(stager.artifact_dir(&event()).join("README.txt"), "x").unwrap();

        let found = stager.event_artifacts(&event()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.event_id, "401772936");
    }

    #[test]
    fn quarantine_file_holds_reason_and_json_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("s"), tmp.path().join("q"));
        let quarantined = vec![Quarantined::from_record(
            &record("KC", "Chiefs", "Chris Jones", 3),
            "Ambiguous player",
        )];

        assert_eq!(stager.write_quarantine(&event(), &[]).unwrap(), None);
        let path = stager.write_quarantine(&event(), &quarantined).unwrap().unwrap();

        assert_eq!(
            path,
            tmp.path().join("q/2025/regular/nfl_quarantine_week1_401772936.csv")
        );
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Ambiguous player"));
        assert!(text.contains(r#""{""yards"":3}""#));
    }
}
