// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The executable entry point: assembles the configuration, prepares the
//! run's output directory and logging, loads the route and obstacle files,
//! and flies the route to completion.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dronedp::{
    debug_parameters, read_points, Config, DpStats, FlightLogger, HybridAutomaton,
    RandomWalkDisturbance,
};

/// Command-line switches. Every configuration key can be overridden here;
/// a `--config_file` is loaded first and explicit flags win over it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Load this key=value configuration file before applying any flag
    #[clap(long = "config_file")]
    config_file: Option<PathBuf>,
    /// Appended to the name of the output directory
    #[clap(long)]
    description: Option<String>,
    /// The obstacle source file
    #[clap(long = "collision_cloud_file")]
    collision_cloud_file: Option<PathBuf>,
    /// The waypoint source file
    #[clap(long = "route_file")]
    route_file: Option<PathBuf>,
    /// The horizon of every solve
    #[clap(long = "number_of_stages")]
    number_of_stages: Option<usize>,
    /// Weight of the obstacle-proximity cost term; 0 disables it
    #[clap(long = "collision_cost_factor")]
    collision_cost_factor: Option<f32>,
    /// Solve against the disturbance family rather than its null member
    #[clap(long = "disturbance_on")]
    disturbance_on: Option<bool>,
    /// Inject disturbances during the simulation
    #[clap(long = "apply_disturbance")]
    apply_disturbance: Option<bool>,
    /// Expected dwell time of the disturbance source
    #[clap(long = "disturbance_change_factor")]
    disturbance_change_factor: Option<u32>,
    /// Stop a solve once the finite-state count has settled
    #[clap(long = "enable_norm_fix_point")]
    enable_norm_fix_point: Option<bool>,
    /// Stop a solve once the region around x0 is covered
    #[clap(long = "enable_initial_fix_point")]
    enable_initial_fix_point: Option<bool>,
    /// Advance the policy stage once per period of sub-ticks
    #[clap(long = "use_single_stage_controller")]
    use_single_stage_controller: Option<bool>,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(-1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let raw = match &args.config_file {
        Some(path) => Config::load_raw(path)
            .with_context(|| format!("loading the configuration file {}", path.display()))?,
        None => Default::default(),
    };
    let mut config = Config::from_map(&raw)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    let out_dir = create_output_directory(&config.description)?;
    let _guard = setup_logging(&out_dir);
    debug_parameters();

    // keep an exact record of what this run was fed
    config.save(File::create(out_dir.join("config.txt"))?)?;
    fs::copy(&config.route_file, out_dir.join("route.txt"))?;
    fs::copy(&config.collision_cloud_file, out_dir.join("collision_cloud.txt"))?;

    let route = read_points(&config.route_file)
        .with_context(|| format!("loading the route file {}", config.route_file.display()))?;
    let obstacles = read_points(&config.collision_cloud_file).with_context(|| {
        format!(
            "loading the collision cloud file {}",
            config.collision_cloud_file.display()
        )
    })?;

    let disturbance = RandomWalkDisturbance::from_entropy(
        config.disturbance_on && config.apply_disturbance,
        config.disturbance_change_factor,
    );
    let stats = Arc::new(DpStats::create(out_dir.join("dp_stats.txt"))?);

    let mut automaton =
        HybridAutomaton::new(route, obstacles, config.clone(), Box::new(disturbance))
            .context("setting up the hybrid automaton failed")?;
    automaton.set_solve_observer(stats);
    automaton.add_observer(Box::new(FlightLogger::with_file(out_dir.join("log.txt"))?));
    automaton.run_until_end()?;

    info!("Done.");
    Ok(())
}

fn apply_overrides(config: &mut Config, args: Args) {
    if let Some(value) = args.description {
        config.description = value;
    }
    if let Some(value) = args.collision_cloud_file {
        config.collision_cloud_file = value;
    }
    if let Some(value) = args.route_file {
        config.route_file = value;
    }
    if let Some(value) = args.number_of_stages {
        config.number_of_stages = value;
    }
    if let Some(value) = args.collision_cost_factor {
        config.collision_cost_factor = value;
    }
    if let Some(value) = args.disturbance_on {
        config.disturbance_on = value;
    }
    if let Some(value) = args.apply_disturbance {
        config.apply_disturbance = value;
    }
    if let Some(value) = args.disturbance_change_factor {
        config.disturbance_change_factor = value;
    }
    if let Some(value) = args.enable_norm_fix_point {
        config.enable_norm_fix_point = value;
    }
    if let Some(value) = args.enable_initial_fix_point {
        config.enable_initial_fix_point = value;
    }
    if let Some(value) = args.use_single_stage_controller {
        config.use_single_stage_controller = value;
    }
}

fn create_output_directory(description: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let name = if description.is_empty() {
        timestamp.to_string()
    } else {
        format!("{timestamp} ({description})")
    };
    let path = PathBuf::from(".").join(name);
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Console and per-run file logging; the returned guard must stay alive for
/// the file writer to flush.
fn setup_logging(directory: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(directory, "run.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    guard
}
