#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the gridiron CLI: logger setup and a per-event
//! progress bar.
//!
//! Log lines go through `indicatif-log-bridge` so they print above the bar
//! instead of tearing it.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gridiron_source::progress::{LogProgress, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const EVENTS_TEMPLATE: &str =
    "{prefix:.bold} [{bar:40.green/black}] {pos}/{len} {msg} ({elapsed}, eta {eta})";

/// Event progress rendered as an `indicatif` bar.
///
/// Spins until the number of events is known, then switches to a bar.
/// Failed events are tallied in the bar's prefix.
pub struct IndicatifProgress {
    bar: ProgressBar,
    failed: AtomicU64,
}

impl IndicatifProgress {
    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            failed: AtomicU64::new(0),
        }
    }

    /// Adds an event bar to `multi`, falling back to [`LogProgress`] when
    /// stderr is not a terminal.
    #[must_use]
    pub fn events_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        if !std::io::stderr().is_terminal() {
            log::info!("{message}");
            return Arc::new(LogProgress::default());
        }

        let bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(message.to_string());

        Arc::new(Self::with_bar(bar))
    }

    fn refresh_prefix(&self) {
        let failed = self.failed.load(Ordering::Relaxed);
        if failed > 0 {
            self.bar.set_prefix(format!("events ({failed} failed)"));
        } else {
            self.bar.set_prefix("events");
        }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        if let Ok(style) = ProgressStyle::with_template(EVENTS_TEMPLATE) {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.failed.store(0, Ordering::Relaxed);
        self.bar.set_length(total);
        self.bar.reset();
        self.refresh_prefix();
    }

    fn event_done(&self, event_id: &str, outcome: &str) {
        if outcome != "completed" {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.refresh_prefix();
        }
        self.bar.set_message(format!("{event_id} {outcome}"));
        self.bar.inc(1);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// `RUST_LOG` controls the filter; without it, `info` and above are shown.
/// Every progress bar must be added to the returned [`MultiProgress`].
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}
