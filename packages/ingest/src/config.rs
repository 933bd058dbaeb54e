//! Ingest configuration.
//!
//! Read from a TOML file; every key has a default, so an empty file (or
//! no file) is a valid configuration:
//!
//! ```toml
//! database_path = "data/gridiron.duckdb"
//! schedule_dir = "data/schedules"
//! buffer_minutes = 180
//!
//! [fetch]
//! request_delay_ms = 1500
//! concurrency = 2
//! ```

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use gridiron_database::batch::DEFAULT_STALE_LOCK_MINUTES;
use gridiron_database::paths;
use gridiron_database::tracker::DEFAULT_MAX_EVENT_RETRIES;
use gridiron_schedule::DEFAULT_BUFFER_MINUTES;
use gridiron_source::FetchConfig;
use gridiron_stage::Stager;
use serde::{Deserialize, Serialize};

use crate::IngestError;

/// Environment variable that overrides [`IngestConfig::database_path`].
pub const DB_PATH_ENV: &str = "GRIDIRON_DB_PATH";

/// Everything a run needs besides its batch key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// `DuckDB` file.
    pub database_path: PathBuf,
    /// Directory of weekly schedule files.
    pub schedule_dir: PathBuf,
    /// Root of staged artifacts.
    pub staging_dir: PathBuf,
    /// Root of quarantine files.
    pub quarantine_dir: PathBuf,
    /// Minutes after kickoff before an event counts as final.
    pub buffer_minutes: i64,
    /// Failures before an event is given up on.
    pub max_event_retries: u32,
    /// Age in minutes after which a run lock is considered abandoned.
    pub stale_lock_minutes: i64,
    /// HTTP fetch settings.
    pub fetch: FetchConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_path: paths::default_db_path(),
            schedule_dir: paths::schedules_dir(),
            staging_dir: paths::staging_dir(),
            quarantine_dir: paths::quarantine_dir(),
            buffer_minutes: DEFAULT_BUFFER_MINUTES,
            max_event_retries: DEFAULT_MAX_EVENT_RETRIES,
            stale_lock_minutes: DEFAULT_STALE_LOCK_MINUTES,
            fetch: FetchConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Configuration`] if the text is not a valid
    /// configuration.
    pub fn from_toml(text: &str) -> Result<Self, IngestError> {
        let config: Self = toml::from_str(text).map_err(|e| IngestError::Configuration {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration: the file if given, defaults otherwise,
    /// then the `GRIDIRON_DB_PATH` override.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Configuration`] if the file cannot be read
    /// or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, IngestError> {
        let mut config = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|e| IngestError::Configuration {
                        message: format!("cannot read {}: {e}", path.display()),
                    })?;
                log::debug!("Loaded config from {}", path.display());
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        if let Ok(db_path) = std::env::var(DB_PATH_ENV)
            && !db_path.trim().is_empty()
        {
            log::info!("Using database {db_path} from {DB_PATH_ENV}");
            config.database_path = PathBuf::from(db_path);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), IngestError> {
        let problem = if self.buffer_minutes < 0 {
            Some("buffer_minutes must not be negative")
        } else if self.max_event_retries == 0 {
            Some("max_event_retries must be at least 1")
        } else if self.stale_lock_minutes <= 0 {
            Some("stale_lock_minutes must be positive")
        } else if self.fetch.max_attempts == 0 {
            Some("fetch.max_attempts must be at least 1")
        } else if self.fetch.concurrency == 0 {
            Some("fetch.concurrency must be at least 1")
        } else {
            None
        };

        problem.map_or(Ok(()), |message| {
            Err(IngestError::Configuration {
                message: message.to_string(),
            })
        })
    }

    /// Completion-gate buffer.
    #[must_use]
    pub fn buffer(&self) -> TimeDelta {
        TimeDelta::minutes(self.buffer_minutes)
    }

    /// Run-lock staleness threshold.
    #[must_use]
    pub fn stale_lock(&self) -> TimeDelta {
        TimeDelta::minutes(self.stale_lock_minutes)
    }

    /// Stager over the configured roots.
    #[must_use]
    pub fn stager(&self) -> Stager {
        Stager::new(&self.staging_dir, &self.quarantine_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = IngestConfig::from_toml("").unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.buffer(), TimeDelta::hours(3));
        assert_eq!(config.max_event_retries, 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = IngestConfig::from_toml(
            r#"
            database_path = "/tmp/test.duckdb"
            buffer_minutes = 240

            [fetch]
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/test.duckdb"));
        assert_eq!(config.buffer(), TimeDelta::hours(4));
        assert_eq!(config.fetch.concurrency, 2);
        assert_eq!(config.fetch.request_delay_ms, 1_500);
        assert_eq!(config.stale_lock_minutes, DEFAULT_STALE_LOCK_MINUTES);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for text in ["max_event_retries = 0", "buffer_minutes = -5", "[fetch]\nconcurrency = 0"] {
            assert!(matches!(
                IngestConfig::from_toml(text),
                Err(IngestError::Configuration { .. })
            ));
        }
        assert!(IngestConfig::from_toml("buffer_minutes = \"soon\"").is_err());
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = IngestConfig::load(Some(Path::new("/nonexistent/gridiron.toml"))).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
