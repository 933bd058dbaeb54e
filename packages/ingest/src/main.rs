#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the box-score ingestion tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use duckdb::Connection;
use gridiron_cli_utils::{IndicatifProgress, MultiProgress};
use gridiron_database::{batch, loader, resolver, roster, tracker};
use gridiron_database_models::BOXSCORE_IMPORT;
use gridiron_ingest::{Ingest, IngestConfig, IngestError, batch_key};
use gridiron_ingest_models::{ExitCategory, RunOptions, RunSummary};
use gridiron_source::HttpFetcher;
use gridiron_source::espn::EspnBoxscoreExtractor;
use gridiron_stats_models::{SeasonType, Week};

#[derive(Parser)]
#[command(name = "gridiron_ingest", about = "NFL box-score ingestion tool")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WeekArgs {
    /// Season year (e.g. 2025)
    #[arg(long)]
    season: i32,
    /// Week number, or "playoffs"
    #[arg(long)]
    week: Week,
    /// Season type: preseason, regular, or postseason
    #[arg(long, default_value = "regular")]
    season_type: SeasonType,
}

impl WeekArgs {
    const fn options(&self) -> RunOptions {
        RunOptions::new(self.season, self.week, self.season_type)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, stage, and load every final event of a week
    Run {
        #[command(flatten)]
        week: WeekArgs,
        /// Reprocess events that are already completed or given up on
        #[arg(long)]
        force_reload: bool,
        /// Print the plan without fetching or writing anything
        #[arg(long)]
        dry_run: bool,
        /// Schedule file to use instead of the conventional one
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Reload already-staged artifacts without fetching
    Load {
        #[command(flatten)]
        week: WeekArgs,
        /// Print the plan without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the run status of a week and events needing review
    Status {
        #[command(flatten)]
        week: WeekArgs,
    },
    /// Put a permanently failed event back in the queue
    Requeue {
        /// Source event id
        event_id: String,
    },
    /// Map an alternate spelling to an existing player
    Alias {
        /// Team code (e.g. KC)
        #[arg(long)]
        team: String,
        /// Spelling as it appears in box scores
        #[arg(long)]
        alias: String,
        /// Player row the alias points to
        #[arg(long)]
        player_id: i64,
    },
    /// Recompute event scores for a week from loaded stats
    Scores {
        #[command(flatten)]
        week: WeekArgs,
    },
    /// Seed players, jersey numbers, and positions from a roster CSV
    Roster {
        /// Roster CSV (team,name,jersey,position,...)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let multi = gridiron_cli_utils::init_logger();
    let cli = Cli::parse();

    match run(cli, &multi).await {
        Ok(category) => ExitCode::from(category.code()),
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn open_database(config: &IngestConfig, dry_run: bool) -> Result<Connection, IngestError> {
    if dry_run && !config.database_path.exists() {
        log::info!(
            "{} does not exist yet; planning against an empty store",
            config.database_path.display()
        );
        return Ok(gridiron_database::open_in_memory()?);
    }
    Ok(gridiron_database::open(&config.database_path)?)
}

fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("Interrupt received; stopping after the current event");
                cancel.store(true, Ordering::SeqCst);
            }
            Err(e) => log::error!("Failed to install Ctrl-C handler: {e}"),
        }
    });
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli, multi: &MultiProgress) -> Result<ExitCategory, IngestError> {
    let config = IngestConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            week,
            force_reload,
            dry_run,
            schedule,
        } => {
            let options = week
                .options()
                .with_force_reload(force_reload)
                .with_dry_run(dry_run)
                .with_schedule(schedule);
            let conn = open_database(&config, dry_run)?;
            let fetcher = HttpFetcher::new(config.fetch.clone())?;
            let extractor = EspnBoxscoreExtractor::new()?;

            let cancel = Arc::new(AtomicBool::new(false));
            install_interrupt_handler(Arc::clone(&cancel));

            let summary = Ingest::new(&conn, &config)
                .with_progress(IndicatifProgress::events_bar(multi, "Reading schedule"))
                .with_cancel(cancel)
                .run(&options, &fetcher, &extractor, Utc::now())
                .await?;
            print_summary(&summary);
            Ok(summary.exit_category())
        }
        Commands::Load { week, dry_run } => {
            let options = week.options().with_dry_run(dry_run);
            let conn = open_database(&config, dry_run)?;

            let cancel = Arc::new(AtomicBool::new(false));
            install_interrupt_handler(Arc::clone(&cancel));

            let summary = Ingest::new(&conn, &config)
                .with_progress(IndicatifProgress::events_bar(multi, "Scanning staged artifacts"))
                .with_cancel(cancel)
                .load(&options, Utc::now())?;
            print_summary(&summary);
            Ok(summary.exit_category())
        }
        Commands::Status { week } => {
            let conn = gridiron_database::open(&config.database_path)?;
            let options = week.options();
            let key = batch_key(&options);

            match batch::get(&conn, &key)? {
                Some(status) => {
                    println!("{key}: {}", status.status);
                    println!(
                        "  processed {}/{}",
                        status.processed_count, status.total_count
                    );
                    if let Some(started) = status.started_at {
                        println!("  started   {started}");
                    }
                    if let Some(completed) = status.completed_at {
                        println!("  finished  {completed}");
                    }
                    if let Some(error) = &status.error {
                        println!("  error     {error}");
                    }
                }
                None => println!("{key}: never run"),
            }

            let events = tracker::list(
                &conn,
                options.season,
                options.season_type,
                options.week,
                BOXSCORE_IMPORT,
            )?;
            if !events.is_empty() {
                println!();
                println!("{:<12} {:<20} {:>8}  LAST ERROR", "EVENT", "STATE", "FAILURES");
                println!("{}", "-".repeat(60));
                for event in &events {
                    println!(
                        "{:<12} {:<20} {:>8}  {}",
                        event.event_id,
                        event.state.as_ref(),
                        event.attempts,
                        event.last_error.as_deref().unwrap_or("")
                    );
                }
            }

            let review = tracker::permanently_failed(&conn, BOXSCORE_IMPORT)?;
            if !review.is_empty() {
                println!();
                println!("Needs review (requeue with `gridiron_ingest requeue <event_id>`):");
                for event in &review {
                    println!(
                        "  {} ({} {} week {})",
                        event.event_id, event.season, event.season_type, event.week
                    );
                }
            }
            Ok(ExitCategory::Success)
        }
        Commands::Requeue { event_id } => {
            let conn = gridiron_database::open(&config.database_path)?;
            if tracker::requeue(&conn, &event_id, BOXSCORE_IMPORT, Utc::now())? {
                println!("Event {event_id} requeued");
            } else {
                println!("Event {event_id} is not failed; nothing to do");
            }
            Ok(ExitCategory::Success)
        }
        Commands::Alias {
            team,
            alias,
            player_id,
        } => {
            let conn = gridiron_database::open(&config.database_path)?;
            resolver::add_player_alias(&conn, &team, &alias, player_id)?;
            println!("{alias:?} on {team} now resolves to player {player_id}");
            Ok(ExitCategory::Success)
        }
        Commands::Scores { week } => {
            let conn = gridiron_database::open(&config.database_path)?;
            let lines =
                loader::recompute_scores(&conn, week.season, week.season_type, week.week)?;

            println!("{:<12} {:>5} {:>5}  CHANGED", "EVENT", "AWAY", "HOME");
            println!("{}", "-".repeat(34));
            for line in &lines {
                println!(
                    "{:<12} {:>5} {:>5}  {}",
                    line.event_id,
                    line.away_score.map_or_else(|| "-".to_string(), |s| s.to_string()),
                    line.home_score.map_or_else(|| "-".to_string(), |s| s.to_string()),
                    if line.changed { "yes" } else { "" }
                );
            }
            Ok(ExitCategory::Success)
        }
        Commands::Roster { file } => {
            let conn = gridiron_database::open(&config.database_path)?;
            let entries = roster::read_roster(&file)?;
            let report = roster::import_roster(&conn, &entries)?;
            println!(
                "{} players seeded, {} updated, {} unchanged, {} skipped",
                report.inserted, report.updated, report.unchanged, report.skipped
            );
            Ok(ExitCategory::Success)
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if summary.dry_run {
        println!(
            "Dry run: {} scheduled, {} not final, {} already loaded",
            summary.scheduled, summary.not_ready, summary.already_loaded
        );
        if summary.planned.is_empty() {
            println!("Nothing to process.");
        } else {
            println!("Would process: {}", summary.planned.join(", "));
        }
        return;
    }

    println!(
        "{} completed, {} failed ({} permanently), {} quarantined records in {:.1}s",
        summary.completed(),
        summary.failed(),
        summary.permanently_failed(),
        summary.quarantined(),
        summary.duration.as_secs_f64()
    );
    for event in summary.events.iter().filter(|e| e.error.is_some()) {
        println!(
            "  {} {}: {}",
            event.event_id,
            event.outcome,
            event.error.as_deref().unwrap_or("")
        );
    }
    for event_id in &summary.needs_review {
        println!("  {event_id} permanently_failed earlier; requeue it to retry");
    }
    if summary.interrupted {
        println!("Interrupted; rerun to continue with the remaining events.");
    }
}
