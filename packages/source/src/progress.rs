//! Per-event progress reporting for ingest runs.
//!
//! The pipeline reports through [`ProgressCallback`] and never renders
//! anything itself. The CLI plugs in an `indicatif` bar; tests and
//! library callers use [`NullProgress`] or [`LogProgress`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress updates while a batch of events is processed.
///
/// Implementations must be `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of events the run will attempt.
    fn set_total(&self, total: u64);

    /// An event finished (successfully or not). `outcome` is a short
    /// label such as `completed` or `failed`.
    fn event_done(&self, event_id: &str, outcome: &str);

    /// Free-form status line.
    fn set_message(&self, msg: String);

    /// The run is over.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn event_done(&self, _event_id: &str, _outcome: &str) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Reports progress as `log` lines, for non-interactive runs.
#[derive(Debug, Default)]
pub struct LogProgress {
    total: AtomicU64,
    done: AtomicU64,
}

impl LogProgress {
    /// Events reported so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

impl ProgressCallback for LogProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    fn event_done(&self, event_id: &str, outcome: &str) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        log::info!("[{done}/{total}] event {event_id}: {outcome}");
    }

    fn set_message(&self, msg: String) {
        log::info!("{msg}");
    }

    fn finish(&self, msg: String) {
        log::info!("{msg}");
    }
}
