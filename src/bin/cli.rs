//! stridepath CLI - Debug tool for replaying walks through the guidance engine
//!
//! Usage:
//!   stridepath-cli replay <route.gpx> <walk.gpx> [--config <cfg.json>] [--json]
//!   stridepath-cli simulate <route.gpx> [--noise <m>] [--seed <n>] [--detour <m>]
//!
//! The route GPX is turned into turn-by-turn instructions, then every fix of
//! the walk is fed through the engine. Recalculations are answered by a
//! direct (straight line) provider so deviation handling can be inspected
//! offline.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use gpx::{Gpx, read};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stridepath::{
    ApproachTier, FixOutcome, GeoPoint, GpsFix, GuidanceConfig, GuidanceEngine,
    GuidanceError, GuidanceEventSink, ManualClock, RecalculationCoordinator, RouteInstruction,
    RouteModel, RouteProvider, SessionUpdate,
    synthetic::{WalkScenario, offset_fixes},
};

#[derive(Parser)]
#[command(name = "stridepath-cli")]
#[command(about = "Debug tool for turn-by-turn guidance replay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with guidance config overrides
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print every session update as a JSON line
    #[arg(long, global = true)]
    json: bool,

    /// Douglas-Peucker tolerance (degrees) used to build the route
    #[arg(long, global = true, default_value = "0.00005")]
    tolerance: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded walk against a route
    Replay {
        /// GPX file describing the planned route
        route: PathBuf,

        /// GPX file with the recorded walk
        walk: PathBuf,

        /// Milliseconds between consecutive walk points
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Walk a route with synthetic GPS noise
    Simulate {
        /// GPX file describing the planned route
        route: PathBuf,

        /// GPS noise standard deviation in meters
        #[arg(long, default_value = "3.0")]
        noise: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Shift the second half of the walk sideways by this many meters
        #[arg(long)]
        detour: Option<f64>,
    },
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Replay {
            route,
            walk,
            interval_ms,
        } => load_route(&route, cli.tolerance, &config).and_then(|route| {
            let points = load_gpx_points(&walk)?;
            let fixes = points
                .iter()
                .enumerate()
                .map(|(i, p)| GpsFix::at(*p, i as u64 * interval_ms))
                .collect();
            run_replay(route, fixes, config, cli.json)
        }),
        Commands::Simulate {
            route,
            noise,
            seed,
            detour,
        } => load_route(&route, cli.tolerance, &config).and_then(|route| {
            let mut fixes = WalkScenario::along(route.polyline().to_vec())
                .with_noise(noise)
                .with_seed(seed)
                .generate();
            if let Some(meters) = detour {
                let half = fixes.len() / 2;
                let shifted = offset_fixes(&fixes[half..], 0.0, meters);
                fixes.truncate(half);
                fixes.extend(shifted);
            }
            run_replay(route, fixes, config, cli.json)
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<GuidanceConfig, String> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
            serde_json::from_str(&content).map_err(|e| e.to_string())?
        }
        None => GuidanceConfig::default(),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Read all track points (falling back to route points) from a GPX file
fn load_gpx_points(path: &Path) -> Result<Vec<GeoPoint>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let gpx: Gpx = read(BufReader::new(file)).map_err(|e| e.to_string())?;

    let mut points = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            for pt in &segment.points {
                let p = pt.point();
                points.push(GeoPoint::new(p.y(), p.x()));
            }
        }
    }
    if points.is_empty() {
        for route in &gpx.routes {
            for pt in &route.points {
                let p = pt.point();
                points.push(GeoPoint::new(p.y(), p.x()));
            }
        }
    }

    if points.is_empty() {
        return Err(format!("{}: no track or route points found", path.display()));
    }
    Ok(points)
}

fn load_route(path: &Path, tolerance: f64, config: &GuidanceConfig) -> Result<RouteModel, String> {
    let points = load_gpx_points(path)?;
    let route = RouteModel::from_track(&points, tolerance, config.fallback_walking_speed)
        .map_err(|e| e.to_string())?;

    println!("\n{}", "=".repeat(60));
    println!("Route: {}", path.display());
    println!("{}", "=".repeat(60));
    println!(
        "  {} points -> {} vertices, {} instructions, {:.0}m",
        points.len(),
        route.polyline().len(),
        route.len(),
        route.total_distance()
    );
    for instruction in route.instructions() {
        println!("  [{:2}] {}", instruction.index, instruction.text);
    }
    Ok(route)
}

fn run_replay(
    route: RouteModel,
    fixes: Vec<GpsFix>,
    config: GuidanceConfig,
    json: bool,
) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| e.to_string())?;

    let clock = Arc::new(ManualClock::new(0));
    let provider: Arc<dyn RouteProvider> = Arc::new(DirectRouteProvider {
        walking_speed: config.fallback_walking_speed,
    });
    let destination = route.end_point();
    let mut engine = GuidanceEngine::new(
        config,
        Arc::clone(&provider),
        Box::new(ConsoleSink),
        clock.clone(),
    )
    .map_err(|e| e.to_string())?;
    engine.start(route, destination).map_err(|e| e.to_string())?;

    let mut stats = ReplayStats::default();
    for fix in fixes {
        clock.set(fix.timestamp);
        let (outcome, ticket) = engine.handle_fix(fix);
        stats.record(&outcome);
        if json {
            if let Some(update) = outcome.update() {
                print_json(update);
            }
        }
        if let Some(ticket) = ticket {
            let (ticket, result) =
                runtime.block_on(RecalculationCoordinator::fetch(Arc::clone(&provider), ticket));
            let outcome = engine.finish_recalculation(ticket, result);
            println!("  recalculation: {:?}", outcome);
            stats.recalculations += 1;
        }
    }

    let snapshot = engine.session().snapshot();
    println!("\n{}", "=".repeat(60));
    println!("Summary");
    println!("{}", "=".repeat(60));
    println!("  final state:      {:?}", snapshot.state);
    println!("  progress:         {}%", snapshot.progress_percent);
    println!(
        "  step:             {}/{}",
        snapshot.current_step_index,
        snapshot.instruction_count.saturating_sub(1)
    );
    println!("  updates:          {}", stats.updated);
    println!("  debounced:        {}", stats.debounced);
    println!("  rejected:         {}", stats.rejected);
    println!("  recalculations:   {}", stats.recalculations);
    Ok(())
}

fn print_json(update: &SessionUpdate) {
    match serde_json::to_string(update) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("  [ERR] Failed to encode update: {}", e),
    }
}

#[derive(Default)]
struct ReplayStats {
    updated: usize,
    debounced: usize,
    rejected: usize,
    recalculations: usize,
}

impl ReplayStats {
    fn record(&mut self, outcome: &FixOutcome) {
        match outcome {
            FixOutcome::Updated(_) => self.updated += 1,
            FixOutcome::NoSignificantChange => self.debounced += 1,
            FixOutcome::Rejected(_) => self.rejected += 1,
            FixOutcome::Suspended(_) => {}
        }
    }
}

/// Answers recalculations with a straight line to the destination
struct DirectRouteProvider {
    walking_speed: f64,
}

#[async_trait]
impl RouteProvider for DirectRouteProvider {
    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        _profile: &str,
    ) -> Result<RouteModel, GuidanceError> {
        RouteModel::from_track(&[origin, destination], 0.0, self.walking_speed)
            .map_err(|e| GuidanceError::RouteUnavailable(e.to_string()))
    }
}

/// Prints guidance events the way a banner/voice layer would receive them
struct ConsoleSink;

impl GuidanceEventSink for ConsoleSink {
    fn on_step_changed(&mut self, instruction: &RouteInstruction) {
        println!("  >> step {}: {}", instruction.index, instruction.text);
    }

    fn on_progress(&mut self, _update: &SessionUpdate) {}

    fn on_turn_approach(&mut self, instruction: &RouteInstruction, tier: ApproachTier) {
        println!(
            "  .. approaching step {} (tier {}): {}",
            instruction.index,
            tier.level(),
            instruction.text
        );
    }

    fn on_deviation_started(&mut self) {
        println!("  !! off route");
    }

    fn on_deviation_cleared(&mut self) {
        println!("  ok back on route");
    }

    fn on_arrived(&mut self) {
        println!("  ** arrived");
    }

    fn on_route_replaced(&mut self, route: &RouteModel) {
        println!(
            "  ~~ new route: {} instructions, {:.0}m",
            route.len(),
            route.total_distance()
        );
    }

    fn on_recalculation_failed(&mut self, reason: &str) {
        println!("  !! recalculation failed: {}", reason);
    }
}
