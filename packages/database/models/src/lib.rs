#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row types and state enums for the `DuckDB` store.
//!
//! These mirror the tables created by `gridiron_database`. They are
//! distinct from the extraction-side types in `gridiron_stats_models`,
//! which describe data before it has canonical ids.

use chrono::{DateTime, NaiveDate, Utc};
use gridiron_stats_models::{EntityKind, Quarantined, SeasonType, StatCategory, StatFields, Week};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Import kind recorded for box-score runs.
pub const BOXSCORE_IMPORT: &str = "boxscore";

/// Position assigned before any category has implied one.
pub const UNKNOWN_POSITION: &str = "UNK";

/// A franchise row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Surrogate key.
    pub id: i64,
    /// Canonical code (`KC`).
    pub code: String,
    /// Full name (`Kansas City Chiefs`).
    pub name: String,
}

/// A player row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Surrogate key.
    pub id: i64,
    /// Name as displayed in box scores.
    pub display_name: String,
    /// Team the player was first seen with.
    pub team_id: i64,
    /// Jersey number, when the source provided one.
    pub jersey: Option<String>,
    /// Position code; `UNK` until a category implies one.
    pub position: String,
    /// `event_id:raw_ref` of the record that created the row.
    pub created_from: Option<String>,
}

/// A loaded game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Surrogate key.
    pub id: i64,
    /// Source event id.
    pub external_id: String,
    /// Season year.
    pub season: i32,
    /// Season type.
    pub season_type: SeasonType,
    /// Week.
    pub week: Week,
    /// Game date, if known.
    pub event_date: Option<NaiveDate>,
    /// Home team.
    pub home_team_id: i64,
    /// Away team.
    pub away_team_id: i64,
    /// Home points.
    pub home_score: Option<i64>,
    /// Away points.
    pub away_score: Option<i64>,
}

/// One entity's stat line for one category of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEventStat {
    /// Team or player.
    pub entity_kind: EntityKind,
    /// `teams.id` or `players.id`, per `entity_kind`.
    pub entity_id: i64,
    /// `events.id`.
    pub event_id: i64,
    /// Team the entity played for in this event.
    pub team_id: i64,
    /// Stat category.
    pub category: StatCategory,
    /// Merged stat values.
    pub fields: StatFields,
}

/// A resolved entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    /// `teams.id` or `players.id`, per `kind`.
    pub id: i64,
    /// Team or player.
    pub kind: EntityKind,
    /// Display name.
    pub display_name: String,
    /// Team, for players.
    pub team_id: Option<i64>,
    /// Position, for players.
    pub position: Option<String>,
}

/// Run-level status of a week's import.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    /// Created but not started.
    Pending,
    /// A run holds the lock.
    InProgress,
    /// The last run finished with every event completed.
    Completed,
    /// The last run finished with failures or was interrupted.
    Failed,
}

/// The durable run checkpoint for one `(season, season_type, week,
/// import_kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchImportStatus {
    /// Season year.
    pub season: i32,
    /// Season type.
    pub season_type: SeasonType,
    /// Week.
    pub week: Week,
    /// What is being imported (`boxscore`).
    pub import_kind: String,
    /// Current status.
    pub status: BatchStatus,
    /// Events attempted by the current or last run.
    pub processed_count: u64,
    /// Events the current or last run set out to process.
    pub total_count: u64,
    /// When the current or last run began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last run ended.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error summary of the last run.
    pub error: Option<String>,
}

/// Per-event progress state.
///
/// `Unseen -> Pending -> Fetching -> {Completed | Failed}`. `Failed`
/// events are retried by later runs until the failure count reaches the
/// limit, then become `PermanentlyFailed` until requeued.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventState {
    /// No row exists yet.
    Unseen,
    /// Known and waiting to be processed.
    Pending,
    /// A run is working on it.
    Fetching,
    /// Loaded and committed.
    Completed,
    /// The last attempt failed; retried next run.
    Failed,
    /// Gave up; needs manual review.
    PermanentlyFailed,
}

impl EventState {
    /// Whether the tracker may move from `self` to `next`.
    ///
    /// `Fetching -> Fetching` covers a run that died mid-event;
    /// `Completed`/`PermanentlyFailed -> Fetching` is only reached through
    /// a forced reload.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unseen | Self::Failed | Self::PermanentlyFailed, Self::Pending)
                | (
                    Self::Pending
                        | Self::Failed
                        | Self::Fetching
                        | Self::Completed
                        | Self::PermanentlyFailed,
                    Self::Fetching,
                )
                | (
                    Self::Fetching,
                    Self::Completed | Self::Failed | Self::PermanentlyFailed
                )
        )
    }

    /// Whether a normal (unforced) run skips this event.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::PermanentlyFailed)
    }
}

/// Tracker row for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImportStatus {
    /// Source event id.
    pub event_id: String,
    /// What is being imported (`boxscore`).
    pub import_kind: String,
    /// Season year.
    pub season: i32,
    /// Season type.
    pub season_type: SeasonType,
    /// Week.
    pub week: Week,
    /// Current state.
    pub state: EventState,
    /// Failures so far.
    pub attempts: u32,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of loading one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Source event id.
    pub event_id: String,
    /// `events.id`, once the event row exists.
    pub event_row_id: Option<i64>,
    /// Stat rows created.
    pub inserted: u64,
    /// Stat rows whose values changed.
    pub updated: u64,
    /// Stat rows already identical.
    pub unchanged: u64,
    /// Records withheld because their entity could not be resolved.
    pub quarantined: Vec<Quarantined>,
    /// Players first seen in this event.
    pub players_created: u64,
    /// Home points after the load.
    pub home_score: Option<i64>,
    /// Away points after the load.
    pub away_score: Option<i64>,
    /// Set when the transaction was rolled back.
    pub error: Option<String>,
}

impl LoadReport {
    /// Whether the load changed any stat row.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle_is_allowed() {
        assert!(EventState::Unseen.can_transition_to(EventState::Pending));
        assert!(EventState::Pending.can_transition_to(EventState::Fetching));
        assert!(EventState::Fetching.can_transition_to(EventState::Completed));
        assert!(EventState::Fetching.can_transition_to(EventState::Failed));
        assert!(EventState::Failed.can_transition_to(EventState::Fetching));
        assert!(EventState::PermanentlyFailed.can_transition_to(EventState::Pending));
    }

    #[test]
    fn skipping_fetch_is_rejected() {
        assert!(!EventState::Pending.can_transition_to(EventState::Completed));
        assert!(!EventState::Unseen.can_transition_to(EventState::Fetching));
        assert!(!EventState::Completed.can_transition_to(EventState::Failed));
        assert!(!EventState::Completed.can_transition_to(EventState::Pending));
    }

    #[test]
    fn states_use_snake_case_text() {
        assert_eq!(EventState::PermanentlyFailed.to_string(), "permanently_failed");
        assert_eq!("in_progress".parse::<BatchStatus>().unwrap(), BatchStatus::InProgress);
    }
}
