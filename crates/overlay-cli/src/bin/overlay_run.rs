//! Run the overlay loop against the built-in flight simulator.

use clap::{Parser, ValueEnum};
use overlay_cli::{init_tracing, run_overlay_loop, Config, RunOptions};
use overlay_core::{AircraftState, RotationMode};
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Rotation {
    HeadingUp,
    NorthUp,
    TrackUp,
}

/// Simulated moving-map overlay (terrain, traffic, weather)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Start latitude (default: Denver area)
    #[arg(long, default_value_t = 39.65)]
    lat: f64,

    /// Start longitude
    #[arg(long, default_value_t = -105.3)]
    lon: f64,

    /// Start altitude in feet
    #[arg(long, default_value_t = 11_500.0)]
    altitude: f64,

    /// Initial heading in degrees true
    #[arg(long, default_value_t = 270.0)]
    heading: f64,

    /// Ground speed in knots
    #[arg(long, default_value_t = 140.0)]
    speed: f64,

    /// Vertical speed in feet per minute
    #[arg(long, default_value_t = -500.0, allow_negative_numbers = true)]
    vs: f64,

    /// Number of simulated traffic targets
    #[arg(long, default_value_t = 12)]
    traffic: usize,

    /// Simulator seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Render rate in Hz
    #[arg(long, default_value_t = 4.0)]
    rate: f64,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(long)]
    duration: Option<u64>,

    /// Map range in nm (overrides OVERLAY_RANGE_NM)
    #[arg(long)]
    range: Option<f64>,

    /// Map orientation
    #[arg(long, value_enum, default_value = "heading-up")]
    rotation: Rotation,

    /// Do not contact weather or elevation services
    #[arg(long)]
    offline: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("overlay_cli=info")?;
    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(range) = args.range.filter(|r| r.is_finite() && *r > 0.0) {
        config.range_nm = range;
    }

    let rate = if args.rate.is_finite() && args.rate > 0.0 { args.rate } else { 4.0 };
    let start = AircraftState::new(args.lat, args.lon, args.altitude)
        .with_heading(args.heading, args.heading)
        .with_motion(args.speed, args.vs);
    anyhow::ensure!(start.position_is_valid(), "start position {},{} is invalid", args.lat, args.lon);

    let rotation = match args.rotation {
        Rotation::HeadingUp => RotationMode::HeadingUp,
        Rotation::NorthUp => RotationMode::NorthUp,
        Rotation::TrackUp => RotationMode::TrackUp,
    };

    run_overlay_loop(
        config,
        RunOptions {
            start,
            traffic: args.traffic,
            seed: args.seed,
            tick: Duration::from_secs_f64(1.0 / rate),
            duration: args.duration.map(Duration::from_secs),
            offline: args.offline,
            rotation,
        },
    )
    .await
}
