//! Benchmark-driver harness around the miogemm library crates.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use serde_json::json;

use miogemm_bench::{FindParams, SimDevice, Tuner};
use miogemm_core::{Constraints, DevInfo, Geometry, MiogError, Offsets, OutPart, Solution, Ver, Writer};

use crate::cache::SolutionCache;

mod cache;

/// Verbosity override environment variable.
const LOG_LEVEL_ENV: &str = "MIOGEMM_LOG_LEVEL";
/// Seed override environment variable.
const SEED_ENV: &str = "MIOGEMM_SEED";

#[derive(Parser, Debug)]
#[command(name = "miogemm-tune", about = "GEMM kernel auto-tuner harness")]
struct Cli {
    /// Canonical geometry string; may be given several times.
    #[arg(long = "geometry", required = true)]
    geometries: Vec<String>,

    /// Wall-clock budget per geometry, in seconds.
    #[arg(long = "budget-seconds", default_value_t = 10.0)]
    budget_seconds: f64,

    /// Colon-joined constraint string, e.g. `A_WOS0:C_ICE1`.
    #[arg(long)]
    constraints: Option<String>,

    /// Output verbosity mode.
    #[arg(long)]
    verbosity: Option<String>,

    /// Master PRNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the winning solution(s).
    #[arg(long)]
    output: Option<PathBuf>,

    /// YAML file with find parameters; flags override its fields.
    #[arg(long = "find-params")]
    find_params: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own message; usage problems are exit code 1.
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &MiogError) -> u8 {
    match err {
        MiogError::UserInput(_) => 1,
        MiogError::GraphEmpty(_) | MiogError::NoValidStart(_) => 2,
        MiogError::NumericSanity(_) => 4,
        _ => 3,
    }
}

fn run(cli: Cli) -> Result<(), MiogError> {
    let params = resolve_params(&cli)?;
    let constraints = match &cli.constraints {
        Some(joined) => Constraints::from_string(joined)?,
        None => Constraints::empty(),
    };

    let log_path = params.verbosity.file_required().then(|| match &cli.output {
        Some(out) => out.with_extension("log"),
        None => PathBuf::from("miogemm-tune.log"),
    });
    let mut writer = Writer::new(params.verbosity, log_path)?;

    let cache = SolutionCache::from_env()?;

    let mut solutions = Vec::with_capacity(cli.geometries.len());
    for geometry_str in &cli.geometries {
        let geometry = Geometry::from_string(geometry_str)?;

        if let Some(cache) = &cache {
            if let Some(solution) = cache.load(&geometry) {
                writer.write(
                    OutPart::Cch,
                    &format!("cache hit for {}", geometry.canonical_string()),
                );
                solutions.push(solution);
                continue;
            }
        }

        let device = SimDevice::new(DevInfo::default_test_device());
        let mut tuner = Tuner::new(Box::new(device), geometry, Offsets::zero())?;
        let solution = tuner.find(cli.budget_seconds, &constraints, &params, &mut writer)?;

        if let Some(cache) = &cache {
            cache.store(&solution)?;
            writer.write(
                OutPart::Cch,
                &format!("cached {}", solution.geometry.canonical_string()),
            );
        }
        solutions.push(solution);
    }

    if let Some(output) = &cli.output {
        write_outputs(output, &solutions, &params)?;
    }
    writer.flush();
    Ok(())
}

fn resolve_params(cli: &Cli) -> Result<FindParams, MiogError> {
    let mut params = match &cli.find_params {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            serde_yaml::from_str(&text).map_err(|err| {
                MiogError::UserInput(
                    miogemm_core::ErrorInfo::new("find-params-parse", err.to_string())
                        .with_context("path", path.display().to_string()),
                )
            })?
        }
        None => FindParams::default(),
    };
    if cli.find_params.is_none() && cli.verbosity.is_none() && std::env::var(LOG_LEVEL_ENV).is_err() {
        params.verbosity = Ver::Terminal;
    }
    if let Some(v) = &cli.verbosity {
        params.verbosity = Ver::from_str_name(v)?;
    }
    if let Ok(v) = std::env::var(LOG_LEVEL_ENV) {
        params.verbosity = Ver::from_str_name(&v)?;
    }
    if let Some(seed) = cli.seed {
        params.seed = seed;
    } else if let Ok(seed) = std::env::var(SEED_ENV) {
        params.seed = seed.parse::<u64>().map_err(|_| {
            MiogError::UserInput(miogemm_core::ErrorInfo::new(
                "seed-parse",
                format!("{SEED_ENV} is not an unsigned integer"),
            ))
        })?;
    }
    Ok(params)
}

fn write_outputs(output: &PathBuf, solutions: &[Solution], params: &FindParams) -> Result<(), MiogError> {
    for (index, solution) in solutions.iter().enumerate() {
        let path = if solutions.len() == 1 {
            output.clone()
        } else {
            let mut name = output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "solution".to_string());
            name = format!("{index}-{name}");
            output.with_file_name(name)
        };
        fs::write(&path, solution.to_text())?;
    }

    let manifest = json!({
        "written_at": Utc::now().to_rfc3339(),
        "seed": params.seed,
        "solutions": solutions
            .iter()
            .map(|s| {
                json!({
                    "geometry": s.geometry.canonical_string(),
                    "hypas": s.hypas.canonical_string(),
                    "median_ms": s.median_time_ms,
                    "gflops": s.median_gflops,
                    "discovered_s": s.discovery_time_s,
                })
            })
            .collect::<Vec<_>>(),
    });
    let manifest_path = output.with_extension("manifest.json");
    fs::write(
        manifest_path,
        serde_json::to_string_pretty(&manifest).unwrap_or_default(),
    )?;
    Ok(())
}
