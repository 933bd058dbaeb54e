#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Schedule files and the completion gate.
//!
//! [`parser`] turns a week's schedule file into ordered [`EventRef`]s and
//! [`gate`] decides which of them are final enough to fetch.
//!
//! [`EventRef`]: gridiron_stats_models::EventRef

pub mod gate;
pub mod parser;

pub use gate::{CompletionDecision, DEFAULT_BUFFER_MINUTES, classify, decide};
pub use parser::{
    ParsedSchedule, ScheduleContext, ScheduleError, SkippedLine, parse_schedule, read_schedule,
    schedule_path,
};
