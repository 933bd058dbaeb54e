//! Schedule file parsing.
//!
//! A schedule file lists one event URL per line. Blank lines and `#`
//! comments are ignored, except for matchup comments of the form
//!
//! ```text
//! # LAC @ KC - 2025-09-06T00:20Z
//! https://www.espn.com/nfl/game/_/gameId/401772936
//! ```
//!
//! which attach the matchup and kickoff time to the next URL line. A URL
//! line may also carry its own timestamp after whitespace; that one wins.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use gridiron_stats_models::{EventRef, Matchup, SeasonType, Week};
use regex::Regex;

static MATCHUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*(?P<away>.+?)\s+@\s+(?P<home>.+?)\s+-\s+(?P<when>\S+)\s*$")
        .expect("valid regex")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>https?://\S+)(?:\s+(?P<when>\S+))?\s*$").expect("valid regex")
});

static GAME_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/gameId/(?P<id>[0-9]+)").expect("valid regex"));

/// Errors that prevent a schedule from being read at all.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// No schedule file exists for the requested week.
    #[error("Schedule file not found: {}", path.display())]
    NotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("I/O error reading schedule: {0}")]
    Io(#[from] std::io::Error),
}

/// The batch key every event in a schedule file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleContext {
    /// Season year.
    pub season: i32,
    /// Week within the season.
    pub week: Week,
    /// Season type.
    pub season_type: SeasonType,
}

/// A line that could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line: usize,
    /// Why the line was skipped.
    pub reason: String,
}

/// Result of parsing a schedule file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSchedule {
    /// Events in file order.
    pub events: Vec<EventRef>,
    /// Lines that looked like events but could not be parsed.
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Default)]
struct Header {
    matchup: Option<Matchup>,
    when: Option<String>,
}

/// Returns the conventional schedule path for a batch key,
/// e.g. `schedules/regular_week1_2025.txt`.
#[must_use]
pub fn schedule_path(dir: &Path, ctx: &ScheduleContext) -> PathBuf {
    dir.join(format!(
        "{}_week{}_{}.txt",
        ctx.season_type.schedule_prefix(),
        ctx.week,
        ctx.season
    ))
}

/// Reads and parses a schedule file.
///
/// # Errors
///
/// * [`ScheduleError::NotFound`] if the file does not exist
/// * [`ScheduleError::Io`] if it cannot be read
pub fn read_schedule(path: &Path, ctx: &ScheduleContext) -> Result<ParsedSchedule, ScheduleError> {
    if !path.exists() {
        return Err(ScheduleError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    Ok(parse_schedule(&text, ctx))
}

/// Parses schedule text. Never fails as a whole: malformed lines are
/// reported in [`ParsedSchedule::skipped`].
#[must_use]
pub fn parse_schedule(text: &str, ctx: &ScheduleContext) -> ParsedSchedule {
    let mut parsed = ParsedSchedule::default();
    let mut seen = BTreeSet::new();
    let mut header = Header::default();

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if let Some(caps) = MATCHUP_RE.captures(line) {
                header = Header {
                    matchup: Some(Matchup {
                        away: caps["away"].trim().to_string(),
                        home: caps["home"].trim().to_string(),
                    }),
                    when: Some(caps["when"].to_string()),
                };
            }
            continue;
        }

        let Some(caps) = URL_RE.captures(line) else {
            parsed.skipped.push(SkippedLine {
                line: line_no,
                reason: format!("not a URL: {line:?}"),
            });
            continue;
        };

        let url = caps["url"].to_string();
        let Some(id) = GAME_ID_RE.captures(&url).map(|c| c["id"].to_string()) else {
            parsed.skipped.push(SkippedLine {
                line: line_no,
                reason: format!("no gameId in URL {url:?}"),
            });
            header = Header::default();
            continue;
        };

        let current = std::mem::take(&mut header);

        if !seen.insert(id.clone()) {
            log::warn!("Duplicate event {id} on line {line_no}, keeping first occurrence");
            continue;
        }

        let when = caps
            .name("when")
            .map(|m| m.as_str().to_string())
            .or(current.when);
        let (scheduled_at, event_date) = match when.as_deref() {
            Some(text) => parse_when(text).unwrap_or_else(|| {
                log::warn!("Event {id}: unparseable start time {text:?}");
                (None, None)
            }),
            None => (None, None),
        };

        parsed.events.push(EventRef {
            id,
            url,
            scheduled_at,
            event_date,
            season: ctx.season,
            week: ctx.week,
            season_type: ctx.season_type,
            matchup: current.matchup,
        });
    }

    parsed
}

/// Parses a schedule timestamp. A bare date yields only the date.
fn parse_when(text: &str) -> Option<(Option<DateTime<Utc>>, Option<NaiveDate>)> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%MZ") {
        return Some((Some(naive.and_utc()), None));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some((Some(dt.with_timezone(&Utc)), None));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some((None, Some(date)));
    }
    None
}
