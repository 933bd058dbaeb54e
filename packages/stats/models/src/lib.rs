#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event references and the normalized stat record format.
//!
//! Every stage of the pipeline speaks in these types: the schedule parser
//! produces [`EventRef`]s, extractors produce [`StatRecord`]s, the stager
//! serializes them to artifacts, and the loader merges them into the
//! relational store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lowest valid week number.
pub const MIN_WEEK: u8 = 1;

/// Highest valid week number (regular season plus the longest playoff run).
pub const MAX_WEEK: u8 = 22;

/// Part of the season an event belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SeasonType {
    /// Exhibition games before the regular season.
    Preseason,
    /// Regular season games.
    Regular,
    /// Wild card through the championship game.
    #[serde(alias = "playoffs")]
    #[strum(to_string = "postseason", serialize = "playoffs")]
    Postseason,
}

impl SeasonType {
    /// Prefix used by schedule file names (`regular_week1_2025.txt`).
    #[must_use]
    pub const fn schedule_prefix(self) -> &'static str {
        match self {
            Self::Preseason => "preseason",
            Self::Regular => "regular",
            Self::Postseason => "playoffs",
        }
    }
}

/// A week within a season: either a numbered week or the playoffs bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Week {
    /// Numbered week, 1 through [`MAX_WEEK`].
    Number(u8),
    /// Playoff games not tied to a week number.
    Playoffs,
}

impl Week {
    /// Label used after `week` in artifact file names (`1`, `playoffs`).
    #[must_use]
    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Playoffs => f.write_str("playoffs"),
        }
    }
}

/// Error returned when a week string is neither a valid number nor `playoffs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidWeekError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for InvalidWeekError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid week {:?}: expected {MIN_WEEK}-{MAX_WEEK} or \"playoffs\"",
            self.value
        )
    }
}

impl std::error::Error for InvalidWeekError {}

impl FromStr for Week {
    type Err = InvalidWeekError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("playoffs") {
            return Ok(Self::Playoffs);
        }
        match trimmed.parse::<u8>() {
            Ok(n) if (MIN_WEEK..=MAX_WEEK).contains(&n) => Ok(Self::Number(n)),
            _ => Err(InvalidWeekError {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Week {
    type Error = InvalidWeekError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Week> for String {
    fn from(week: Week) -> Self {
        week.to_string()
    }
}

/// Away/home pairing as written in a schedule comment (`LAC @ KC`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    /// Raw away team label.
    pub away: String,
    /// Raw home team label.
    pub home: String,
}

/// A scheduled event, as read from a schedule file.
///
/// Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    /// Source event identifier (ESPN `gameId`).
    pub id: String,
    /// Event page URL.
    pub url: String,
    /// Scheduled kickoff. `None` when the schedule carried no usable time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Calendar date when the schedule only carried a date.
    pub event_date: Option<NaiveDate>,
    /// Season year.
    pub season: i32,
    /// Week within the season.
    pub week: Week,
    /// Season type.
    pub season_type: SeasonType,
    /// Away/home pairing, when the schedule names it.
    pub matchup: Option<Matchup>,
}

impl EventRef {
    /// Best known calendar date for the event.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.event_date
            .or_else(|| self.scheduled_at.map(|at| at.date_naive()))
    }
}

/// Kind of entity a stat line belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    /// A franchise.
    Team,
    /// An individual player.
    Player,
}

/// Raw entity identifier exactly as seen in source data.
///
/// Players usually appear as `Name` or the `Name#Jersey` composite;
/// teams as a code or a full name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Whether this refers to a team or a player.
    pub kind: EntityKind,
    /// Raw text from the source.
    pub raw: String,
}

impl EntityRef {
    /// Creates a team reference.
    #[must_use]
    pub fn team(raw: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Team,
            raw: raw.into(),
        }
    }

    /// Creates a player reference.
    #[must_use]
    pub fn player(raw: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Player,
            raw: raw.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.raw)
    }
}

/// Box-score stat category.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatCategory {
    /// Quarterback passing line.
    Passing,
    /// Rushing line.
    Rushing,
    /// Receiving line.
    Receiving,
    /// Fumbles.
    Fumbles,
    /// Tackles, sacks and other defensive stats.
    Defensive,
    /// Interceptions made by defenders.
    Interceptions,
    /// Kickoff returns.
    KickReturns,
    /// Punt returns.
    PuntReturns,
    /// Field goals and extra points.
    Kicking,
    /// Punting.
    Punting,
    /// Team-level final score line.
    Scoring,
}

impl StatCategory {
    /// Every category that appears as a box-score section.
    pub const BOX_SCORE: [Self; 10] = [
        Self::Passing,
        Self::Rushing,
        Self::Receiving,
        Self::Fumbles,
        Self::Defensive,
        Self::Interceptions,
        Self::KickReturns,
        Self::PuntReturns,
        Self::Kicking,
        Self::Punting,
    ];

    /// Section heading used on box-score pages (`Kick Returns`).
    #[must_use]
    pub const fn page_label(self) -> &'static str {
        match self {
            Self::Passing => "Passing",
            Self::Rushing => "Rushing",
            Self::Receiving => "Receiving",
            Self::Fumbles => "Fumbles",
            Self::Defensive => "Defensive",
            Self::Interceptions => "Interceptions",
            Self::KickReturns => "Kick Returns",
            Self::PuntReturns => "Punt Returns",
            Self::Kicking => "Kicking",
            Self::Punting => "Punting",
            Self::Scoring => "Scoring",
        }
    }

    /// Stable column header for staged artifacts of this category.
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Passing => &[
                "completions",
                "attempts",
                "yards",
                "average",
                "touchdowns",
                "interceptions",
                "sacks",
                "sack_yards",
                "qbr",
                "rating",
            ],
            Self::Rushing => &["attempts", "yards", "average", "touchdowns", "long"],
            Self::Receiving => &[
                "receptions",
                "yards",
                "average",
                "touchdowns",
                "long",
                "targets",
            ],
            Self::Fumbles => &["fumbles", "lost", "recovered"],
            Self::Defensive => &[
                "tackles",
                "solo",
                "sacks",
                "tackles_for_loss",
                "passes_defended",
                "qb_hits",
                "touchdowns",
            ],
            Self::Interceptions => &["interceptions", "yards", "touchdowns"],
            Self::KickReturns | Self::PuntReturns => {
                &["returns", "yards", "average", "long", "touchdowns"]
            }
            Self::Kicking => &[
                "fg_made",
                "fg_attempted",
                "fg_pct",
                "long",
                "xp_made",
                "xp_attempted",
                "points",
            ],
            Self::Punting => &[
                "punts",
                "yards",
                "average",
                "touchbacks",
                "inside_20",
                "long",
            ],
            Self::Scoring => &["side", "points"],
        }
    }

    /// Position implied by appearing in this category, if any.
    #[must_use]
    pub const fn implied_position(self) -> Option<&'static str> {
        match self {
            Self::Passing => Some("QB"),
            Self::Rushing => Some("RB"),
            Self::Receiving | Self::KickReturns | Self::PuntReturns => Some("WR"),
            Self::Kicking => Some("K"),
            Self::Punting => Some("P"),
            Self::Defensive | Self::Interceptions | Self::Fumbles => Some("DEF"),
            Self::Scoring => None,
        }
    }

    /// Normalizes a loose category name (`"Field Goals"`, `"INT"`,
    /// `"kick_returns"`) into a category.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let cleaned = cleaned.trim_matches('_');

        match cleaned {
            "field_goals" | "fg" => Some(Self::Kicking),
            "int" => Some(Self::Interceptions),
            "sacks" | "tackles" | "defense" => Some(Self::Defensive),
            other => other.parse().ok(),
        }
    }
}

/// A single stat value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Whole number (yards, attempts, touchdowns).
    Int(i64),
    /// Decimal value (averages, ratings).
    Float(f64),
    /// Anything that is not numeric (`side`, odd source text).
    Text(String),
}

impl FieldValue {
    /// Parses a raw cell. Empty cells and `--` placeholders yield `None`.
    #[must_use]
    pub fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() || cell == "--" || cell == "-" {
            return None;
        }
        if let Ok(n) = cell.parse::<i64>() {
            return Some(Self::Int(n));
        }
        if let Ok(f) = cell.parse::<f64>() {
            if f.is_finite() {
                return Some(Self::Float(f));
            }
        }
        Some(Self::Text(cell.to_string()))
    }

    /// Returns the value as an integer, truncating floats.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Returns the value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Field name to value mapping. Sorted so serialized forms are stable.
pub type StatFields = BTreeMap<String, FieldValue>;

/// One entity's stat line for one category in one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Source event identifier.
    pub event_id: String,
    /// Raw entity reference.
    pub entity: EntityRef,
    /// Canonical code of the team the entity played for.
    pub team: String,
    /// Raw team label as it appeared in the source.
    pub source_team: String,
    /// Stat category.
    pub category: StatCategory,
    /// Stat values.
    pub fields: StatFields,
}

impl StatRecord {
    /// Returns an integer field, if present and numeric.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_i64)
    }
}

/// A record held back from loading, with the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quarantined {
    /// Source event identifier.
    pub event_id: String,
    /// Raw entity reference.
    pub entity: EntityRef,
    /// Raw team label from the source.
    pub source_team: String,
    /// Canonical team code, when one could be determined.
    pub team: Option<String>,
    /// Stat category.
    pub category: StatCategory,
    /// Stat values as extracted.
    pub fields: StatFields,
    /// Why the record was quarantined.
    pub reason: String,
}

impl Quarantined {
    /// Quarantines a fully normalized record.
    #[must_use]
    pub fn from_record(record: &StatRecord, reason: impl Into<String>) -> Self {
        Self {
            event_id: record.event_id.clone(),
            entity: record.entity.clone(),
            source_team: record.source_team.clone(),
            team: Some(record.team.clone()),
            category: record.category,
            fields: record.fields.clone(),
            reason: reason.into(),
        }
    }
}
