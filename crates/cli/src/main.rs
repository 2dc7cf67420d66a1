#![deny(unsafe_code)]
//! Headless driver for the blobfield particle system.
//!
//! Subcommands:
//! - `run` builds a system from JSON parameters, moves a blob around a circle
//!   for N ticks and prints or writes the published positions
//! - `schema` prints every tunable with its default and range

mod error;

use blobfield_core::{
    Bounds, MatrixSink, NoiseFluid, ParticleSystem, PoolKind, Selection, SystemParams, Vector2,
};
use clap::{Parser, Subcommand};
use error::CliError;
use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "blobfield", about = "Blob-driven particle force field")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Advance a system for N ticks under a blob moving on a circle.
    Run(RunArgs),
    /// Print the parameter schema.
    Schema,
}

#[derive(clap::Args, Debug, Clone)]
struct RunArgs {
    /// Grid particles along x.
    #[arg(short = 'W', long, default_value_t = 16)]
    grid_width: usize,

    /// Grid particles along y.
    #[arg(short = 'H', long, default_value_t = 16)]
    grid_height: usize,

    /// Number of ticks.
    #[arg(short, long, default_value_t = 200)]
    steps: usize,

    /// Seed of the momentum generator.
    #[arg(long)]
    seed: Option<u64>,

    /// System parameters as a JSON string.
    #[arg(long, default_value = "{}")]
    params: String,

    /// Read system parameters from a JSON file instead of --params.
    #[arg(long)]
    params_file: Option<PathBuf>,

    /// Radius of the blob orbit, in simulation units.
    #[arg(long, default_value_t = 0.25)]
    orbit: f64,

    /// Ticks per blob revolution.
    #[arg(long, default_value_t = 120)]
    period: usize,

    /// Force the blob applies to particles under its brush.
    #[arg(long, default_value_t = 0.5)]
    blob_force: f64,

    /// Free particles spawned by the blob at every move.
    #[arg(long, default_value_t = 0)]
    spawn: usize,

    /// Couple particles to a curl-noise flow of this strength.
    #[arg(long)]
    fluid: Option<f64>,

    /// Point magnet at the center with this force.
    #[arg(long)]
    magnet: Option<f64>,

    /// Write the published positions as JSON to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Reads parameters from `--params-file` or `--params`, with `--seed` layered
/// on top.
fn load_params(args: &RunArgs) -> Result<serde_json::Value, CliError> {
    let (text, origin) = match &args.params_file {
        Some(path) => (
            fs::read_to_string(path)
                .map_err(|e| CliError::Io(format!("cannot read {}: {e}", path.display())))?,
            path.display().to_string(),
        ),
        None => (args.params.clone(), "--params".to_string()),
    };
    let mut params: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| CliError::Input(format!("invalid {origin} JSON: {e}")))?;
    let obj = params
        .as_object_mut()
        .ok_or_else(|| CliError::Input(format!("{origin} must be a JSON object")))?;
    if let Some(seed) = args.seed {
        obj.insert("seed".into(), seed.into());
    }
    Ok(params)
}

/// Blob position at `tick` on a circle around `center`.
fn orbit_position(center: Vector2, tick: usize, radius: f64, period: usize) -> Vector2 {
    let angle = TAU * tick as f64 / period.max(1) as f64;
    center + Vector2::new(radius * angle.cos(), radius * angle.sin())
}

/// Builds the system described by `args` and advances it.
fn simulate(args: &RunArgs) -> Result<ParticleSystem<MatrixSink>, CliError> {
    let params = SystemParams::from_json(&load_params(args)?);
    let bounds = params.bounds;
    let sink = MatrixSink::new(bounds, Bounds::symmetric());
    let system = ParticleSystem::new(params, sink);
    system.set_grid_dimensions(args.grid_width, args.grid_height)?;

    let center = bounds.center();
    // first report places the blob without moving anything
    system.report_blob(0, orbit_position(center, 0, args.orbit, args.period));
    let blob = Selection::Index(0);
    let blobs = system.blobs();
    blobs.set_force(blob, args.blob_force);
    blobs.set_apply_force(blob, true);
    blobs.set_spawn_count(blob, args.spawn);

    if let Some(force) = args.magnet {
        system.magnets().set_point_magnet(0, center, force);
    }

    let seed = system.current_params().seed as u32;
    for tick in 1..=args.steps {
        if let Some(strength) = args.fluid {
            let mut flow = NoiseFluid::new(3.0, strength, seed);
            flow.set_time(tick as f64 * 0.01);
            system.set_fluid(Some(Arc::new(flow)));
        }
        system.report_blob(0, orbit_position(center, tick, args.orbit, args.period));
        system.advance();
    }
    log::info!("advanced {} ticks", args.steps);
    Ok(system)
}

/// Largest distance between a grid particle and its rest position.
fn max_displacement(system: &ParticleSystem<MatrixSink>) -> f64 {
    system
        .particles()
        .iter()
        .filter_map(|p| p.rest_position().map(|rest| p.position().distance(rest)))
        .fold(0.0, f64::max)
}

fn write_output(sink: &MatrixSink, path: &Path) -> Result<(), CliError> {
    let text = serde_json::to_string(&sink.to_json())?;
    fs::write(path, text).map_err(|e| CliError::Io(format!("cannot write {}: {e}", path.display())))
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Schema => {
            let schema = ParticleSystem::<MatrixSink>::param_schema();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else if let Some(fields) = schema.as_object() {
                for (name, field) in fields {
                    println!(
                        "  {name:<20} {:<8} default {}",
                        field["type"].as_str().unwrap_or("?"),
                        field["default"]
                    );
                }
            }
        }
        Command::Run(args) => {
            let system = simulate(&args)?;
            if let Some(path) = &args.output {
                system.with_sink(|sink| write_output(sink, path))?;
            }

            let (width, height) = system.grid_dimensions();
            let free = system.free_len();
            let displacement = max_displacement(&system);
            let memory = system.with_sink(|sink| sink.matrix(PoolKind::Grid).dimensions().0);
            if cli.json {
                let info = serde_json::json!({
                    "steps": args.steps,
                    "grid_width": width,
                    "grid_height": height,
                    "free_particles": free,
                    "memory": memory,
                    "max_displacement": displacement,
                    "params": system.params(),
                    "output": args.output.as_ref().map(|p| p.display().to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                eprintln!(
                    "ran {} ticks: {width}x{height} grid, {free} free particles, max displacement {displacement:.4}",
                    args.steps
                );
                if let Some(path) = &args.output {
                    eprintln!("positions written to {}", path.display());
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["blobfield", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            Command::Schema => panic!("expected run"),
        }
    }

    #[test]
    fn defaults_parse() {
        let a = args(&[]);
        assert_eq!((a.grid_width, a.grid_height, a.steps), (16, 16, 200));
        assert!(a.fluid.is_none());
    }

    #[test]
    fn verbosity_counts_flags() {
        let cli = Cli::parse_from(["blobfield", "-vv", "schema"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn seed_flag_overrides_params() {
        let a = args(&["--seed", "9", "--params", r#"{"stiffness": 0.3, "seed": 1}"#]);
        let params = load_params(&a).unwrap();
        assert_eq!(params["seed"], 9);
        assert_eq!(params["stiffness"], 0.3);
    }

    #[test]
    fn bad_params_are_input_errors() {
        let a = args(&["--params", "{nope"]);
        assert_eq!(load_params(&a).unwrap_err().exit_code(), 12);
        let a = args(&["--params", "[1, 2]"]);
        assert_eq!(load_params(&a).unwrap_err().exit_code(), 12);
    }

    #[test]
    fn missing_params_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let a = args(&["--params-file", missing.to_str().unwrap()]);
        assert_eq!(load_params(&a).unwrap_err().exit_code(), 11);
    }

    #[test]
    fn params_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"memory": 4}"#).unwrap();
        let a = args(&["-W", "3", "-H", "3", "-s", "5", "--params-file", path.to_str().unwrap()]);
        let system = simulate(&a).unwrap();
        assert_eq!(system.current_params().memory, 4);
        system.with_sink(|sink| assert_eq!(sink.matrix(PoolKind::Grid).dimensions(), (4, 9)));
    }

    #[test]
    fn orbit_starts_on_the_right() {
        let center = Vector2::new(0.5, 0.5);
        let p = orbit_position(center, 0, 0.25, 100);
        assert!((p.x() - 0.75).abs() < 1e-12);
        assert!((p.y() - 0.5).abs() < 1e-12);
        let q = orbit_position(center, 25, 0.25, 100);
        assert!((q.y() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn custom_bounds_map_onto_the_output_range() {
        let a = args(&[
            "-W",
            "1",
            "-H",
            "1",
            "-s",
            "0",
            "--params",
            r#"{"bounds": {"min": [0.0, 0.0], "max": [2.0, 2.0]}}"#,
        ]);
        let system = simulate(&a).unwrap();
        assert_eq!(system.current_params().bounds.max, Vector2::new(2.0, 2.0));
        system.with_sink(|sink| {
            let rest = sink.rest()[0];
            assert!(rest.norm() < 1e-12, "grid center not mapped to origin: {rest}");
        });
    }

    #[test]
    fn blob_orbit_disturbs_the_grid() {
        let a = args(&["-W", "8", "-H", "8", "-s", "30", "--params", r#"{"momentum": 0}"#]);
        let system = simulate(&a).unwrap();
        assert!(max_displacement(&system) > 0.0);
    }

    #[test]
    fn spawning_blob_fills_free_pool() {
        let a = args(&["-W", "2", "-H", "2", "-s", "10", "--spawn", "2"]);
        let system = simulate(&a).unwrap();
        assert_eq!(system.free_len(), 20);
    }

    #[test]
    fn zero_grid_is_rejected() {
        let a = args(&["-W", "0"]);
        assert_eq!(simulate(&a).err().map(|e| e.exit_code()), Some(10));
    }

    #[test]
    fn fluid_and_magnet_runs_stay_finite() {
        let a = args(&["-W", "4", "-H", "4", "-s", "20", "--fluid", "0.02", "--magnet", "0.5"]);
        let system = simulate(&a).unwrap();
        assert!(system
            .particles()
            .iter()
            .all(|p| p.position().x().is_finite() && p.position().y().is_finite()));
    }

    #[test]
    fn output_file_holds_sink_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let a = args(&["-W", "2", "-H", "3", "-s", "3"]);
        let system = simulate(&a).unwrap();
        system.with_sink(|sink| write_output(sink, &path)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["grid"].as_array().unwrap().len(), 2);
        assert_eq!(value["grid"][0].as_array().unwrap().len(), 6);
        assert_eq!(value["rest"].as_array().unwrap().len(), 6);
    }
}
