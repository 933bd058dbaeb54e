#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch ingestion of NFL box scores into `DuckDB`.
//!
//! A run reads a week's schedule, keeps the events the completion gate
//! considers final, skips those the tracker already settled, then
//! fetches, stages, and loads the rest one event at a time. Per-event
//! failures are recorded and the batch continues; only run-level
//! problems (configuration, missing schedule, store failures, a held run
//! lock) abort it.

pub mod config;
pub mod pipeline;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use gridiron_database::DbError;
use gridiron_database::batch::{BatchError, BatchKey};
use gridiron_database::loader::LoadError;
use gridiron_database::resolver::ResolveError;
use gridiron_database::roster::RosterError;
use gridiron_database::tracker::TrackerError;
use gridiron_database_models::BOXSCORE_IMPORT;
use gridiron_ingest_models::{ExitCategory, RunOptions};
use gridiron_schedule::ScheduleError;
use gridiron_source::{ExtractionError, FetchError};
use gridiron_stage::StageError;

pub use config::IngestConfig;
pub use pipeline::Ingest;

/// Run-level errors. Any of these ends the run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// No schedule file for the requested week.
    #[error("No schedule found at {}", path.display())]
    NoScheduleFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The schedule file lists no events.
    #[error("Schedule {} lists no events", path.display())]
    EmptySchedule {
        /// The empty file.
        path: PathBuf,
    },

    /// Another run holds the week's lock.
    #[error("{key} is already being imported (started {started_at:?})")]
    AlreadyRunning {
        /// The locked batch.
        key: BatchKey,
        /// When the holder started.
        started_at: Option<DateTime<Utc>>,
    },

    /// Schedule file could not be read.
    #[error(transparent)]
    Schedule(ScheduleError),

    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Tracker failure.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Run bookkeeping failure.
    #[error(transparent)]
    Batch(BatchError),

    /// Score recomputation failure.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Alias maintenance failure.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Roster import failure.
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// Staging directory failure.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// The HTTP client could not be built.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The extractor could not be built.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl From<ScheduleError> for IngestError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::NotFound { path } => Self::NoScheduleFound { path },
            other => Self::Schedule(other),
        }
    }
}

impl From<BatchError> for IngestError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::AlreadyRunning { key, started_at } => {
                Self::AlreadyRunning { key, started_at }
            }
            other => Self::Batch(other),
        }
    }
}

impl IngestError {
    /// Exit category for this error.
    #[must_use]
    pub const fn exit_category(&self) -> ExitCategory {
        match self {
            Self::NoScheduleFound { .. } | Self::EmptySchedule { .. } => {
                ExitCategory::NoScheduleFound
            }
            Self::AlreadyRunning { .. } => ExitCategory::AlreadyRunning,
            _ => ExitCategory::FatalError,
        }
    }

    /// Process exit status for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.exit_category().code()
    }
}

/// Why a single event failed. Recorded on the event; the batch goes on.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Fetch failed after retries.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The page is not a recognizable box score.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Artifacts could not be written or read.
    #[error("staging failed: {0}")]
    Stage(#[from] StageError),

    /// The event's transaction was rolled back.
    #[error("load failed: {0}")]
    Load(#[from] LoadError),
}

/// Run-lock key for a run.
#[must_use]
pub fn batch_key(options: &RunOptions) -> BatchKey {
    BatchKey::new(
        options.season,
        options.season_type,
        options.week,
        BOXSCORE_IMPORT,
    )
}
