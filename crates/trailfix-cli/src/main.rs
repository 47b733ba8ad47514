//! Trailfix - operator tool for geofenced check-in and track recording
//!
//! This binary exposes the check-in and tracking pipeline for field checks:
//! - datum conversion of raw device coordinates
//! - distance between two points
//! - check-in evaluation against a checkpoint file
//! - replay of a recorded track through the track recorder

mod replay;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use trailfix_core::{
    checkpoints_from_json, format_distance, is_outside_china, CheckInProgress, CoordinateTransformer,
    GeofenceEvaluator, LocalCoordinate, PositionFix, RawCoordinate,
};
use trailfix_tracking::{LocationError, TrackRecorder, TrackSample, TrackingConfig};

use replay::{LogUploader, ReplayProvider};

#[derive(Parser)]
#[command(name = "trailfix")]
#[command(about = "Geofenced check-in and track recording tools", version)]
struct Cli {
    /// Tracking configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a raw WGS84 coordinate to a local datum
    Convert {
        /// WGS84 latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// WGS84 longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Target datum
        #[arg(long, value_enum, default_value_t = TargetDatum::Gcj02)]
        to: TargetDatum,
    },

    /// Great-circle distance between two points
    Distance {
        /// First point as `lat,lon`
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: (f64, f64),
        /// Second point as `lat,lon`
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: (f64, f64),
    },

    /// Evaluate a position against a checkpoint file
    Checkin {
        /// Checkpoint file (JSON array)
        #[arg(long)]
        checkpoints: PathBuf,
        /// Latitude of the position
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude of the position
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Position accuracy in meters
        #[arg(long, default_value_t = 0.0)]
        accuracy: f64,
        /// The position is raw WGS84 and must be converted first
        #[arg(long)]
        raw: bool,
        /// Checkpoint ids already checked in, for progress
        #[arg(long, value_delimiter = ',')]
        completed: Vec<u64>,
    },

    /// Replay a recorded track through the track recorder
    Replay {
        /// Track file (JSON array of raw points)
        #[arg(long)]
        track: PathBuf,
        /// Activity the track belongs to
        #[arg(long)]
        activity: u64,
        /// Override the sample buffer cap
        #[arg(long)]
        max_samples: Option<usize>,
        /// Override the automatic flush interval (e.g. `30s`)
        #[arg(long, value_parser = humantime::parse_duration)]
        flush_interval: Option<Duration>,
        /// Delay between replayed points (e.g. `200ms`)
        #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
        step_delay: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetDatum {
    Gcj02,
    Bd09,
}

/// Parse `lat,lon`
fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lon`, got `{}`", s))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {}", e))?;
    Ok((lat, lon))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TrackingConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TrackingConfig::default(),
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Command::Convert { lat, lon, to } => convert(&config, lat, lon, to),
        Command::Distance { from, to } => distance(from, to),
        Command::Checkin {
            checkpoints,
            lat,
            lon,
            accuracy,
            raw,
            completed,
        } => checkin(&config, &checkpoints, lat, lon, accuracy, raw, &completed),
        Command::Replay {
            track,
            activity,
            max_samples,
            flush_interval,
            step_delay,
        } => {
            let mut config = config;
            if let Some(max) = max_samples {
                config.recorder.max_samples = max;
            }
            if let Some(interval) = flush_interval {
                config.recorder.flush_interval = interval;
            }
            config.validate()?;
            replay(config, &track, activity, step_delay).await
        }
    }
}

fn convert(config: &TrackingConfig, lat: f64, lon: f64, to: TargetDatum) -> anyhow::Result<ExitCode> {
    let raw = RawCoordinate::new(lat, lon);
    anyhow::ensure!(raw.is_valid(), "invalid coordinate {}", raw);

    if is_outside_china(&raw) {
        warn!(%raw, policy = ?config.source.region_policy, "Coordinate is outside mainland China");
    }

    let local = CoordinateTransformer::new(config.source.region_policy).to_local_datum(&raw);
    let output = match to {
        TargetDatum::Gcj02 => serde_json::json!({
            "datum": local.datum_name(),
            "latitude": local.latitude,
            "longitude": local.longitude,
            "lngLat": local.to_lng_lat_string(),
        }),
        TargetDatum::Bd09 => {
            let bd = local.to_bd09();
            serde_json::json!({
                "datum": bd.datum_name(),
                "latitude": bd.latitude,
                "longitude": bd.longitude,
                "lngLat": bd.to_lng_lat_string(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn distance(from: (f64, f64), to: (f64, f64)) -> anyhow::Result<ExitCode> {
    let a = LocalCoordinate::new(from.0, from.1);
    let b = LocalCoordinate::new(to.0, to.1);
    anyhow::ensure!(a.is_valid() && b.is_valid(), "invalid coordinate");

    let meters = a.distance_to(&b);
    let output = serde_json::json!({
        "meters": meters,
        "formatted": format_distance(meters),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn checkin(
    config: &TrackingConfig,
    path: &Path,
    lat: f64,
    lon: f64,
    accuracy: f64,
    raw: bool,
    completed: &[u64],
) -> anyhow::Result<ExitCode> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading checkpoints {}", path.display()))?;
    let checkpoints = checkpoints_from_json(&json)?;
    anyhow::ensure!(!checkpoints.is_empty(), "{} has no checkpoints", path.display());

    let fix = if raw {
        let raw = RawCoordinate::new(lat, lon);
        anyhow::ensure!(raw.is_valid(), "invalid coordinate {}", raw);
        let transformer = CoordinateTransformer::new(config.source.region_policy);
        let mut fix = PositionFix::manual(transformer.to_local_datum(&raw), accuracy);
        fix.raw_coordinate = Some(raw);
        fix
    } else {
        let local = LocalCoordinate::new(lat, lon);
        anyhow::ensure!(local.is_valid(), "invalid coordinate {}", local);
        PositionFix::manual(local, accuracy)
    };
    debug!(coordinate = %fix.coordinate, raw = ?fix.raw_coordinate, "Evaluating check-in");

    let evaluations = GeofenceEvaluator::evaluate_all(&fix, &checkpoints);
    let progress = CheckInProgress::compute(&checkpoints, completed);
    let Some((nearest, result)) = GeofenceEvaluator::nearest(&fix, &checkpoints) else {
        anyhow::bail!("{} has no checkpoints", path.display());
    };

    let output = serde_json::json!({
        "position": fix.coordinate,
        "evaluations": evaluations,
        "nearest": {
            "checkpointId": nearest.id,
            "name": nearest.name,
            "inRange": result.in_range,
            "distanceMeters": result.distance_meters,
            "formatted": format_distance(result.distance_meters as f64),
            "shortfallMeters": result.shortfall_meters(nearest.radius_meters),
        },
        "progress": progress,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if result.in_range {
        info!(checkpoint = nearest.id, distance_m = result.distance_meters, "Within range");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            checkpoint = nearest.id,
            distance_m = result.distance_meters,
            radius_m = nearest.radius_meters,
            "Out of range of the nearest checkpoint"
        );
        Ok(ExitCode::from(2))
    }
}

#[derive(Default)]
struct TrackProgress {
    last: Option<LocalCoordinate>,
    meters: f64,
}

async fn replay(
    config: TrackingConfig,
    track: &Path,
    activity: u64,
    step_delay: Duration,
) -> anyhow::Result<ExitCode> {
    let readings = replay::load_track(track)?;
    info!(points = readings.len(), track = %track.display(), "Loaded track");

    let provider = Arc::new(ReplayProvider::new(readings, step_delay));
    let recorder = TrackRecorder::new(activity, provider.clone(), Arc::new(LogUploader), config);

    let progress = Arc::new(Mutex::new(TrackProgress::default()));
    let sink = progress.clone();
    recorder.start(
        Arc::new(move |sample: &TrackSample| {
            let mut progress = sink.lock();
            if let Some(last) = progress.last {
                progress.meters += last.distance_to(&sample.coordinate);
            }
            progress.last = Some(sample.coordinate);
        }),
        Arc::new(|err: &LocationError| {
            if err.is_watch_closed() {
                debug!("Replay track exhausted");
            } else {
                warn!(error = %err, "Replay reading failed");
            }
        }),
    )?;

    let delivered = provider.finished().await?;
    let outcome = recorder.stop().await?;
    let stats = recorder.stats();

    info!(
        delivered,
        received = stats.samples_received,
        evicted = stats.samples_evicted,
        uploaded = stats.samples_uploaded,
        flushes = stats.flushes_succeeded,
        final_flush = ?outcome,
        distance = %format_distance(progress.lock().meters),
        "Replay complete"
    );
    Ok(ExitCode::SUCCESS)
}
