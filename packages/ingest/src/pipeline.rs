//! The batch pipeline.
//!
//! schedule -> tracker + completion gate -> fetch -> extract ->
//! normalize -> stage -> load -> tracker.
//!
//! Fetches may run a few at a time (`fetch.concurrency`), but results are
//! consumed in schedule order and each event is staged, loaded, and
//! checkpointed before the next one starts. The tracker row is written
//! only after the event's transaction has committed, so a run cancelled
//! between events resumes exactly where it stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::Connection;
use futures::StreamExt;
use futures::stream;
use gridiron_database::batch::{self, BatchKey};
use gridiron_database::{loader, tracker};
use gridiron_database_models::{BOXSCORE_IMPORT, BatchStatus, EventState, LoadReport};
use gridiron_ingest_models::{EventOutcome, EventResult, RunOptions, RunSummary};
use gridiron_schedule::{
    CompletionDecision, ScheduleContext, classify, read_schedule, schedule_path,
};
use gridiron_source::progress::{ProgressCallback, null_progress};
use gridiron_source::{EventFetcher, Extractor, RawContent, normalize};
use gridiron_stage::{Stager, read_artifact};
use gridiron_stats_models::{EventRef, Quarantined};

use crate::{EventError, IngestConfig, IngestError, batch_key};

/// Runs batches against one open database.
pub struct Ingest<'a> {
    conn: &'a Connection,
    config: &'a IngestConfig,
    stager: Stager,
    progress: Arc<dyn ProgressCallback>,
    cancel: Arc<AtomicBool>,
}

impl<'a> Ingest<'a> {
    /// Creates a pipeline with no progress output and no cancellation.
    #[must_use]
    pub fn new(conn: &'a Connection, config: &'a IngestConfig) -> Self {
        Self {
            conn,
            config,
            stager: config.stager(),
            progress: null_progress(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reports per-event progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Stops between events once `cancel` is set.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn schedule(&self, options: &RunOptions) -> Result<Vec<EventRef>, IngestError> {
        let ctx = ScheduleContext {
            season: options.season,
            week: options.week,
            season_type: options.season_type,
        };
        let path = options
            .schedule
            .clone()
            .unwrap_or_else(|| schedule_path(&self.config.schedule_dir, &ctx));

        let parsed = read_schedule(&path, &ctx)?;
        for skipped in &parsed.skipped {
            log::warn!(
                "{}:{}: skipped: {}",
                path.display(),
                skipped.line,
                skipped.reason
            );
        }
        if parsed.events.is_empty() {
            return Err(IngestError::EmptySchedule { path });
        }

        log::info!("Read {} events from {}", parsed.events.len(), path.display());
        Ok(parsed.events)
    }

    /// Runs one week: gate, fetch, stage, and load every event that is
    /// final and not yet settled.
    ///
    /// `now` drives the completion gate and stamps the run lock.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] for run-level failures only. Failed events
    /// are reported in the summary.
    pub async fn run(
        &self,
        options: &RunOptions,
        fetcher: &dyn EventFetcher,
        extractor: &dyn Extractor,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, IngestError> {
        let started = Instant::now();
        let events = self.schedule(options)?;
        let buffer = self.config.buffer();

        let mut summary = RunSummary {
            scheduled: events.len(),
            dry_run: options.dry_run,
            ..RunSummary::default()
        };
        let mut todo = Vec::new();
        for event in &events {
            let state = tracker::state(self.conn, &event.id, BOXSCORE_IMPORT)?;
            let loaded = !options.force_reload && state == EventState::Completed;
            match classify(event, now, buffer, loaded) {
                CompletionDecision::Pending => {
                    log::info!("Event {}: not final yet, holding", event.id);
                    summary.not_ready += 1;
                }
                CompletionDecision::AlreadyLoaded => {
                    log::debug!("Event {}: skipping, already loaded", event.id);
                    summary.already_loaded += 1;
                }
                CompletionDecision::ReadyToFetch
                    if state == EventState::PermanentlyFailed && !options.force_reload =>
                {
                    log::warn!(
                        "Event {}: permanently failed earlier, requeue it to retry",
                        event.id
                    );
                    summary.needs_review.push(event.id.clone());
                }
                CompletionDecision::ReadyToFetch => todo.push(event.clone()),
            }
        }
        summary.planned = todo.iter().map(|e| e.id.clone()).collect();

        if options.dry_run {
            log::info!(
                "Dry run: would fetch {} events ({} not final, {} already loaded)",
                todo.len(),
                summary.not_ready,
                summary.already_loaded
            );
            summary.duration = started.elapsed();
            return Ok(summary);
        }

        let key = batch_key(options);
        let stale = self.config.stale_lock();
        batch::begin_run(self.conn, &key, todo.len() as u64, now, stale)?;

        let result = self
            .fetch_and_load(&key, &todo, fetcher, extractor, now, &mut summary)
            .await;
        self.finish(&key, summary, result, started)
    }

    /// Reloads whatever is already staged for the week's events, without
    /// fetching. Events with no artifacts are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] for run-level failures only.
    pub fn load(
        &self,
        options: &RunOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, IngestError> {
        let started = Instant::now();
        let events = self.schedule(options)?;

        let mut staged = Vec::new();
        for event in &events {
            if self.stager.event_artifacts(event)?.is_empty() {
                log::debug!("Event {}: nothing staged", event.id);
            } else {
                staged.push(event.clone());
            }
        }

        let mut summary = RunSummary {
            scheduled: events.len(),
            planned: staged.iter().map(|e| e.id.clone()).collect(),
            dry_run: options.dry_run,
            ..RunSummary::default()
        };
        if options.dry_run {
            summary.duration = started.elapsed();
            return Ok(summary);
        }

        let key = batch_key(options);
        let stale = self.config.stale_lock();
        batch::begin_run(self.conn, &key, staged.len() as u64, now, stale)?;

        let result = self.load_events(&key, &staged, now, &mut summary);
        self.finish(&key, summary, result, started)
    }

    fn load_events(
        &self,
        key: &BatchKey,
        staged: &[EventRef],
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<(), IngestError> {
        tracker::register(self.conn, staged, BOXSCORE_IMPORT, now)?;
        self.progress.set_total(staged.len() as u64);

        for event in staged {
            if self.cancelled() {
                summary.interrupted = true;
                break;
            }
            tracker::mark_fetching(self.conn, &event.id, BOXSCORE_IMPORT, Utc::now())?;
            let loaded = self.load_staged_event(event, None, Vec::new());
            summary.events.push(self.record(event, loaded)?);
            batch::record_progress(self.conn, key, summary.events.len() as u64)?;
        }
        Ok(())
    }

    async fn fetch_and_load(
        &self,
        key: &BatchKey,
        todo: &[EventRef],
        fetcher: &dyn EventFetcher,
        extractor: &dyn Extractor,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<(), IngestError> {
        tracker::register(self.conn, todo, BOXSCORE_IMPORT, now)?;
        self.progress.set_total(todo.len() as u64);

        let mut fetches = stream::iter(todo)
            .map(|event| async move { (event, fetcher.fetch(event).await) })
            .buffered(self.config.fetch.concurrency.max(1));

        while let Some((event, fetched)) = fetches.next().await {
            if self.cancelled() {
                summary.interrupted = true;
                log::warn!(
                    "Interrupted; {} events left for the next run",
                    todo.len() - summary.events.len()
                );
                break;
            }

            tracker::mark_fetching(self.conn, &event.id, BOXSCORE_IMPORT, Utc::now())?;
            let loaded = fetched
                .map_err(EventError::from)
                .and_then(|raw| self.stage_and_load(event, &raw, extractor));
            summary.events.push(self.record(event, loaded)?);
            batch::record_progress(self.conn, key, summary.events.len() as u64)?;
        }
        Ok(())
    }

    fn stage_and_load(
        &self,
        event: &EventRef,
        raw: &RawContent,
        extractor: &dyn Extractor,
    ) -> Result<LoadReport, EventError> {
        let extraction = normalize(event, extractor.extract(raw)?);
        let staged = self
            .stager
            .stage_event(event, extraction.event_date, &extraction.records)?;
        log::debug!(
            "Event {}: {} artifacts staged, {} rewritten",
            event.id,
            staged.artifacts.len(),
            staged.artifacts.iter().filter(|a| a.written).count()
        );

        let mut quarantined = extraction.quarantined;
        quarantined.extend(staged.conflicts);
        self.load_staged_event(event, extraction.event_date, quarantined)
    }

    /// Loads every staged artifact of an event and writes its quarantine
    /// file.
    fn load_staged_event(
        &self,
        event: &EventRef,
        event_date: Option<NaiveDate>,
        mut quarantined: Vec<Quarantined>,
    ) -> Result<LoadReport, EventError> {
        let mut event_date = event_date;
        let mut records = Vec::new();
        for (key, path) in self.stager.event_artifacts(event)? {
            event_date = event_date.or(key.event_date);
            records.extend(read_artifact(&path)?);
        }

        let mut report = loader::try_load(self.conn, event, event_date, &records)?;
        quarantined.append(&mut report.quarantined);
        self.stager.write_quarantine(event, &quarantined)?;
        report.quarantined = quarantined;
        Ok(report)
    }

    /// Checkpoints an event's outcome. Only store failures escape.
    fn record(
        &self,
        event: &EventRef,
        loaded: Result<LoadReport, EventError>,
    ) -> Result<EventResult, IngestError> {
        let (outcome, mut result) = match loaded {
            Ok(report) => (
                tracker::Outcome::Completed,
                EventResult {
                    event_id: event.id.clone(),
                    outcome: EventOutcome::Completed,
                    error: None,
                    inserted: report.inserted,
                    updated: report.updated,
                    quarantined: report.quarantined.len() as u64,
                },
            ),
            Err(e) => {
                log::error!("Event {}: {e}", event.id);
                let message = e.to_string();
                (
                    tracker::Outcome::Failed(message.clone()),
                    EventResult {
                        event_id: event.id.clone(),
                        outcome: EventOutcome::Failed,
                        error: Some(message),
                        inserted: 0,
                        updated: 0,
                        quarantined: 0,
                    },
                )
            }
        };

        let state = tracker::record(
            self.conn,
            &event.id,
            BOXSCORE_IMPORT,
            &outcome,
            self.config.max_event_retries,
            Utc::now(),
        )?;
        if state == EventState::PermanentlyFailed {
            result.outcome = EventOutcome::PermanentlyFailed;
        }

        self.progress.event_done(&event.id, result.outcome.as_ref());
        Ok(result)
    }

    /// Releases the run lock and logs the summary.
    fn finish(
        &self,
        key: &BatchKey,
        mut summary: RunSummary,
        result: Result<(), IngestError>,
        started: Instant,
    ) -> Result<RunSummary, IngestError> {
        summary.duration = started.elapsed();

        let (status, error) = match &result {
            Err(e) => (BatchStatus::Failed, Some(e.to_string())),
            Ok(()) if summary.interrupted => {
                (BatchStatus::Failed, Some("interrupted".to_string()))
            }
            Ok(()) if summary.failed() > 0 => (
                BatchStatus::Failed,
                Some(format!(
                    "{} of {} events failed",
                    summary.failed(),
                    summary.attempted()
                )),
            ),
            Ok(()) => (BatchStatus::Completed, None),
        };

        let finished = batch::finish_run(self.conn, key, status, error.as_deref(), Utc::now());
        result?;
        finished?;

        let line = format!(
            "{key}: {} completed, {} failed, {} quarantined records",
            summary.completed(),
            summary.failed(),
            summary.quarantined()
        );
        log::info!("{line}");
        self.progress.finish(line);
        Ok(summary)
    }
}
