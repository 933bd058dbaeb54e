//! Artifact file naming.
//!
//! Names look like
//! `nfl_KC_passing_week1_20250905_401772936.csv`, or
//! `nfl_KC_passing_weekplayoffs_UNKNOWN_DATE_401772936.csv` when the
//! game date is unknown. The name is the artifact's natural key.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use gridiron_stats_models::{StatCategory, Week};
use regex::Regex;

const UNKNOWN_DATE: &str = "UNKNOWN_DATE";

static ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^nfl_(?P<team>[A-Z0-9]+)_(?P<category>[a-z_]+)",
        r"_week(?P<week>[0-9]+|playoffs)",
        r"_(?P<date>[0-9]{8}|UNKNOWN_DATE)",
        r"_(?P<event>[A-Za-z0-9]+)\.csv$",
    ))
    .expect("valid regex")
});

/// Natural key of a staged artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    /// Canonical team code.
    pub team: String,
    /// Stat category held in the file.
    pub category: StatCategory,
    /// Week the event belongs to.
    pub week: Week,
    /// Game date, if known.
    pub event_date: Option<NaiveDate>,
    /// Source event id.
    pub event_id: String,
}

impl ArtifactKey {
    /// File name for this key.
    #[must_use]
    pub fn file_name(&self) -> String {
        let date = self
            .event_date
            .map_or_else(|| UNKNOWN_DATE.to_string(), |d| d.format("%Y%m%d").to_string());
        format!(
            "nfl_{}_{}_week{}_{date}_{}.csv",
            self.team,
            self.category,
            self.week.label(),
            self.event_id
        )
    }

    /// Whether both keys name the same team, category, and event,
    /// whatever date each carries.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        self.team == other.team
            && self.category == other.category
            && self.week == other.week
            && self.event_id == other.event_id
    }

    /// Parses a file name back into its key. Returns `None` for anything
    /// that is not an artifact name.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = ARTIFACT_RE.captures(file_name)?;
        let event_date = match &caps["date"] {
            UNKNOWN_DATE => None,
            raw => Some(NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?),
        };

        Some(Self {
            team: caps["team"].to_string(),
            category: caps["category"].parse().ok()?,
            week: caps["week"].parse().ok()?,
            event_date,
            event_id: caps["event"].to_string(),
        })
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Quarantine file name for an event.
#[must_use]
pub fn quarantine_file_name(week: Week, event_id: &str) -> String {
    format!("nfl_quarantine_week{}_{event_id}.csv", week.label())
}
