#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetching event pages and extracting box-score statistics.
//!
//! The pipeline talks to two seams defined here:
//!
//! * [`EventFetcher`] retrieves an event's raw page. [`fetcher::HttpFetcher`]
//!   is the production implementation: `reqwest` with a hard timeout,
//!   bounded retry ([`retry`]) and a shared request throttle ([`throttle`]).
//! * [`Extractor`] turns raw page content into per-team stat sections.
//!   [`espn::EspnBoxscoreExtractor`] understands ESPN box-score markup;
//!   everything layout-specific lives there.
//!
//! [`normalize`] then resolves team labels and produces
//! [`StatRecord`](gridiron_stats_models::StatRecord)s.

pub mod columns;
pub mod espn;
pub mod fetcher;
pub mod normalize;
pub mod progress;
pub mod retry;
pub mod throttle;

use chrono::{DateTime, NaiveDate, Utc};
use gridiron_stats_models::{EntityRef, EventRef, StatCategory, StatFields};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use fetcher::{FetchConfig, HttpFetcher};
pub use normalize::{Extraction, normalize};

/// Errors from retrieving an event page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request did not complete within the hard timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The response arrived but its body could not be read as a page.
    #[error("Unparseable response: {0}")]
    Unparseable(String),

    /// Connection-level failure (DNS, reset, TLS).
    #[error("Network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::HttpStatus(code) => *code == 429 || *code >= 500,
            Self::Unparseable(_) => false,
        }
    }
}

/// Errors from turning fetched content into stat sections.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The page parsed but contains nothing recognizable as a box score.
    #[error("No box score found for event {event_id}")]
    NoBoxScore {
        /// Event whose page was empty.
        event_id: String,
    },

    /// A layout selector failed to compile.
    #[error("Invalid selector {selector:?}: {message}")]
    Selector {
        /// The offending selector.
        selector: String,
        /// Parser message.
        message: String,
    },
}

/// Raw page content for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    /// Source event identifier.
    pub event_id: String,
    /// URL the content was fetched from.
    pub url: String,
    /// Response body.
    pub body: String,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

/// Which side of the scoreboard a team is on.
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
pub enum Side {
    /// Visiting team.
    Away,
    /// Home team.
    Home,
}

/// One team's line on the page scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamScore {
    /// Team label as shown on the page.
    pub source_team: String,
    /// Scoreboard side.
    pub side: Side,
    /// Final points, when shown.
    pub points: Option<i64>,
}

/// One team's table for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct StatSection {
    /// Team label as shown on the page.
    pub source_team: String,
    /// Category of the table.
    pub category: StatCategory,
    /// Entity rows in page order.
    pub rows: Vec<(EntityRef, StatFields)>,
}

/// Everything an extractor could read from one event page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedEvent {
    /// Game date printed on the page.
    pub event_date: Option<NaiveDate>,
    /// Scoreboard lines, away first.
    pub scoreboard: Vec<TeamScore>,
    /// Stat tables in page order.
    pub sections: Vec<StatSection>,
}

/// Retrieves raw content for an event.
#[async_trait::async_trait]
pub trait EventFetcher: Send + Sync {
    /// Fetches the event's stat page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] once retries are exhausted or on a permanent
    /// failure.
    async fn fetch(&self, event: &EventRef) -> Result<RawContent, FetchError>;
}

/// Turns raw content into stat sections. One implementation per source
/// layout.
pub trait Extractor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Extracts every stat section on the page. Categories missing from
    /// the page simply produce no sections.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] if the content is not a recognizable
    /// box score.
    fn extract(&self, raw: &RawContent) -> Result<ExtractedEvent, ExtractionError>;
}
