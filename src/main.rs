use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, Duration};

use flight_tracker_rs::acquisition::spawn_pipeline;
use flight_tracker_rs::announce::LogAnnouncer;
use flight_tracker_rs::service::{FlightService, HttpFlightService, OfflineFlightService};
use flight_tracker_rs::source::ReplaySource;
use flight_tracker_rs::status::LiveStatus;
use flight_tracker_rs::{Flight, Tracker, TrackerConfig, TrackerError, TrackerEvent, TrackingStatus};

const STATUS_INTERVAL: Duration = Duration::from_secs(2);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "flight_tracker")]
#[command(about = "Headless flight tracking core driven by a recorded telemetry session", long_about = None)]
struct Args {
    /// Recorded telemetry (.json or .json.gz)
    #[arg(long)]
    replay: PathBuf,

    /// Replay speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Tracker configuration (JSON); missing keys use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Flight to bind at startup (JSON)
    #[arg(long)]
    flight: Option<PathBuf>,

    /// Flight service base URL; without it reports are only logged
    #[arg(long)]
    service_url: Option<String>,

    /// Overrides the configured save directory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Live status JSON, rewritten every 2 seconds
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Start tracking as soon as the start conditions are met
    #[arg(long)]
    start: bool,

    /// Duration in seconds (0 = until the recording ends)
    #[arg(long, default_value = "0")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(dir) = &args.save_dir {
        config.save_dir = dir.clone();
    }
    log::info!("Flight tracker starting");
    log::info!("  Replay: {} ({}x)", args.replay.display(), args.speed);
    log::info!("  Save dir: {}", config.save_dir.display());

    let source = Arc::new(
        ReplaySource::load(&args.replay, args.speed)
            .with_context(|| format!("loading recording {}", args.replay.display()))?,
    );
    let service: Arc<dyn FlightService> = match &args.service_url {
        Some(url) => {
            log::info!("  Flight service: {}", url);
            Arc::new(HttpFlightService::new(url, std::env::var("FLIGHT_SERVICE_TOKEN").ok()))
        }
        None => {
            log::info!("  Flight service: offline");
            Arc::new(OfflineFlightService)
        }
    };

    let tracker = Tracker::new(config, source.clone(), service, Arc::new(LogAnnouncer));
    tokio::spawn(log_tracker_events(tracker.clone()));
    let handles = spawn_pipeline(tracker.clone());

    if let Some(path) = &args.flight {
        let flight = Flight::load(path).with_context(|| format!("loading flight {}", path.display()))?;
        tracker.bind_flight(flight).await?;
    }

    let started = Instant::now();
    let mut last_unmet = Vec::new();
    loop {
        tokio::select! {
            _ = sleep(STATUS_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping");
                break;
            }
        }
        if args.duration > 0 && started.elapsed().as_secs() >= args.duration {
            log::info!("Duration reached, stopping");
            break;
        }
        if source.is_finished() && !tracker.is_connected() {
            log::info!("Recording finished");
            break;
        }

        if args.start && tracker.status().is_preparing() {
            match tracker.start_tracking() {
                Ok(()) => last_unmet.clear(),
                Err(TrackerError::ConditionsNotMet(unmet)) => {
                    if unmet != last_unmet {
                        log::info!("Waiting for start conditions: {:?}", unmet);
                        last_unmet = unmet;
                    }
                }
                Err(e) => log::warn!("Could not start tracking: {}", e),
            }
        }

        if let Some(path) = &args.status_file {
            if let Err(e) = LiveStatus::capture(&tracker, started).save(path) {
                log::warn!("Live status not written: {}", e);
            }
        }
    }

    // leave an unfinished flight resumable
    if tracker.status().is_active() {
        if let Err(e) = tracker.stop_tracking(true).await {
            log::error!("Could not pause the flight on exit: {}", e);
        }
    }
    tracker.shutdown();
    for handle in handles {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            log::warn!("A background loop did not stop in time");
        }
    }

    let final_status = LiveStatus::capture(&tracker, started);
    if let Some(path) = &args.status_file {
        final_status.save(path)?;
    }
    log::info!(
        "Stopped: {}, {} event(s), {} landing(s)",
        final_status.status,
        final_status.events_logged,
        final_status.landings
    );
    if final_status.status == TrackingStatus::Resuming {
        log::info!("Flight saved in {}, bind it again to resume", tracker.config().save_dir.display());
    }
    Ok(())
}

/// Stand-in for a front end: writes outbound events to the log
async fn log_tracker_events(tracker: Arc<Tracker>) {
    let mut events = tracker.subscribe();
    loop {
        match events.recv().await {
            Ok(TrackerEvent::StatusChanged { old, new }) => log::debug!("status {} -> {}", old, new),
            Ok(TrackerEvent::TrackingEvent(entry)) => {
                log::info!("[event {:?}] {}", entry.color, entry.text)
            }
            Ok(TrackerEvent::Landing(report)) => log::info!("Touchdown: {}", report.summary()),
            Ok(TrackerEvent::Aborted { flight_id, reason }) => {
                log::warn!("Flight {} aborted: {}", flight_id, reason)
            }
            Ok(TrackerEvent::FlightCompleted { flight_id }) => log::info!("Flight {} completed", flight_id),
            Ok(TrackerEvent::ConnectionChanged(connected)) => log::info!("Simulator connected: {}", connected),
            Ok(TrackerEvent::Toast(text)) => log::info!("{}", text),
            Ok(other) => log::trace!("{:?}", other),
            Err(RecvError::Lagged(missed)) => log::warn!("Event log fell behind, {} event(s) skipped", missed),
            Err(RecvError::Closed) => break,
        }
    }
}
