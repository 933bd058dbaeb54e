#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Run options, per-event results, and run summaries for ingestion.

use std::path::PathBuf;
use std::time::Duration;

use gridiron_stats_models::{SeasonType, Week};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// What a batch run should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Season year.
    pub season: i32,
    /// Week.
    pub week: Week,
    /// Season type.
    pub season_type: SeasonType,
    /// Reprocess events already completed or given up on.
    pub force_reload: bool,
    /// Plan only: no fetches and no writes.
    pub dry_run: bool,
    /// Schedule file to read instead of the conventional one.
    pub schedule: Option<PathBuf>,
}

impl RunOptions {
    /// Options for a plain run of one week.
    #[must_use]
    pub const fn new(season: i32, week: Week, season_type: SeasonType) -> Self {
        Self {
            season,
            week,
            season_type,
            force_reload: false,
            dry_run: false,
            schedule: None,
        }
    }

    /// Sets `force_reload`.
    #[must_use]
    pub const fn with_force_reload(mut self, force_reload: bool) -> Self {
        self.force_reload = force_reload;
        self
    }

    /// Sets `dry_run`.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Overrides the schedule file.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Option<PathBuf>) -> Self {
        self.schedule = schedule;
        self
    }
}

/// How an event ended in this run.
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
pub enum EventOutcome {
    /// Loaded and committed.
    Completed,
    /// Failed; retried by the next run.
    Failed,
    /// Failed too often; needs a manual requeue.
    PermanentlyFailed,
}

/// Result of one event in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    /// Source event id.
    pub event_id: String,
    /// Final state for this run.
    pub outcome: EventOutcome,
    /// Failure message.
    pub error: Option<String>,
    /// Stat rows created.
    pub inserted: u64,
    /// Stat rows changed.
    pub updated: u64,
    /// Records quarantined.
    pub quarantined: u64,
}

/// Exit categories of the batch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ExitCategory {
    /// Everything attempted succeeded.
    Success,
    /// No schedule for the requested week.
    NoScheduleFound,
    /// Some events failed; what succeeded is committed.
    PartialFailure,
    /// The run could not proceed.
    FatalError,
    /// Another run holds the week's lock.
    AlreadyRunning,
}

impl ExitCategory {
    /// Process exit status.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::NoScheduleFound => 3,
            Self::PartialFailure => 4,
            Self::FatalError => 5,
            Self::AlreadyRunning => 6,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Events in the schedule.
    pub scheduled: usize,
    /// Events the completion gate held back.
    pub not_ready: usize,
    /// Ready events skipped because an earlier run loaded them.
    pub already_loaded: usize,
    /// Ready events an earlier run gave up on. They are not retried until
    /// requeued, and they keep the run from counting as a success.
    pub needs_review: Vec<String>,
    /// Event ids selected for processing, in order.
    pub planned: Vec<String>,
    /// Per-event results, in processing order.
    pub events: Vec<EventResult>,
    /// The run stopped early on request.
    pub interrupted: bool,
    /// Nothing was fetched or written.
    pub dry_run: bool,
    /// Wall time of the run.
    pub duration: Duration,
}

impl RunSummary {
    fn count(&self, outcome: EventOutcome) -> usize {
        self.events.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Events completed.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(EventOutcome::Completed)
    }

    /// Events that failed, including permanent failures.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(EventOutcome::Failed) + self.permanently_failed()
    }

    /// Events given up on, in this run or an earlier one.
    #[must_use]
    pub fn permanently_failed(&self) -> usize {
        self.count(EventOutcome::PermanentlyFailed) + self.needs_review.len()
    }

    /// Events the run accounted for: processed or waiting for review.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.events.len() + self.needs_review.len()
    }

    /// Records quarantined across all events.
    #[must_use]
    pub fn quarantined(&self) -> u64 {
        self.events.iter().map(|e| e.quarantined).sum()
    }

    /// Exit category for this run.
    #[must_use]
    pub fn exit_category(&self) -> ExitCategory {
        if self.failed() > 0 || self.interrupted {
            ExitCategory::PartialFailure
        } else {
            ExitCategory::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, outcome: EventOutcome, quarantined: u64) -> EventResult {
        EventResult {
            event_id: id.to_string(),
            outcome,
            error: None,
            inserted: 0,
            updated: 0,
            quarantined,
        }
    }

    #[test]
    fn clean_run_exits_zero() {
        let summary = RunSummary {
            events: vec![result("1", EventOutcome::Completed, 2)],
            ..RunSummary::default()
        };
        assert_eq!(summary.exit_category(), ExitCategory::Success);
        assert_eq!(summary.quarantined(), 2);
    }

    #[test]
    fn any_failure_is_partial() {
        let summary = RunSummary {
            events: vec![
                result("1", EventOutcome::Completed, 0),
                result("2", EventOutcome::PermanentlyFailed, 0),
            ],
            ..RunSummary::default()
        };
        assert_eq!((summary.completed(), summary.failed()), (1, 1));
        assert_eq!(summary.exit_category().code(), 4);
    }

    #[test]
    fn events_awaiting_review_keep_the_run_partial() {
        let summary = RunSummary {
            already_loaded: 1,
            needs_review: vec!["2".to_string()],
            ..RunSummary::default()
        };
        assert!(summary.events.is_empty());
        assert_eq!((summary.failed(), summary.permanently_failed()), (1, 1));
        assert_eq!(summary.attempted(), 1);
        assert_eq!(summary.exit_category(), ExitCategory::PartialFailure);
    }

    #[test]
    fn interrupted_run_is_partial() {
        let summary = RunSummary {
            interrupted: true,
            ..RunSummary::default()
        };
        assert_eq!(summary.exit_category(), ExitCategory::PartialFailure);
    }
}
