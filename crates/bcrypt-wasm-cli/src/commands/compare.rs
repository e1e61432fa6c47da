//! Compare command - Run the same hash on both engines.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;

use bcrypt_wasm::Salt;
use bcrypt_wasm::bcrypt_wasm_runtime::EngineKind;

use super::{HashOptions, emit};
use crate::OutputFormat;
use crate::config::CliConfig;

/// Arguments for the compare command.
#[derive(Args)]
pub struct CompareArgs {
    /// Password to hash
    #[arg(required = true)]
    pub password: String,

    #[command(flatten)]
    pub options: HashOptions,
}

/// Timings and output for one engine.
#[derive(Debug, Serialize)]
struct EngineRun {
    engine: EngineKind,
    hash: String,
    load_ms: f64,
    hash_ms: f64,
    verify_ms: f64,
}

/// Comparison result.
#[derive(Debug, Serialize)]
struct CompareReport {
    cost: u32,
    version: String,
    agree: bool,
    cross_verified: bool,
    runs: Vec<EngineRun>,
}

/// Execute the compare command.
pub fn execute(args: CompareArgs, config: &CliConfig, format: OutputFormat) -> Result<()> {
    // Both engines must see the same salt.
    let salt = match args.options.salt_bytes()? {
        Some(bytes) => bytes,
        None => Salt::random().as_bytes().to_vec(),
    };
    let params = args.options.params(config);

    let mut runs = Vec::new();
    let mut handles = Vec::new();
    for kind in EngineKind::ALL {
        let start = Instant::now();
        let mut bcrypt = config
            .builder(Some(kind))
            .build()
            .with_context(|| format!("Failed to load bcrypt guest on {} engine", kind))?;
        let load = start.elapsed();

        let start = Instant::now();
        let hash = bcrypt
            .hash(&args.password, Some(&salt), Some(params))
            .with_context(|| format!("Failed to hash on {} engine", kind))?;
        let hashed = start.elapsed();

        let start = Instant::now();
        let own = bcrypt.verify(&args.password, &hash)?;
        let verified = start.elapsed();
        if !own {
            bail!("{} engine failed to verify its own hash", kind);
        }

        tracing::info!(engine = %kind, hash_ms = millis(hashed), "Engine finished");

        runs.push(EngineRun {
            engine: kind,
            hash,
            load_ms: millis(load),
            hash_ms: millis(hashed),
            verify_ms: millis(verified),
        });
        handles.push(bcrypt);
    }

    let agree = runs.windows(2).all(|pair| pair[0].hash == pair[1].hash);

    // Each engine checks every other engine's hash.
    let mut cross_verified = true;
    for (i, bcrypt) in handles.iter_mut().enumerate() {
        for (j, run) in runs.iter().enumerate() {
            if i != j && !bcrypt.verify(&args.password, &run.hash)? {
                cross_verified = false;
            }
        }
    }

    let report = CompareReport {
        cost: params.cost,
        version: params.version.to_string(),
        agree,
        cross_verified,
        runs,
    };

    emit(format, &report, |report| {
        println!("Cost {} / version {}", report.cost, report.version);
        for run in &report.runs {
            println!(
                "  {:<10} load {:>9.2}ms  hash {:>9.2}ms  verify {:>9.2}ms",
                run.engine.as_str(),
                run.load_ms,
                run.hash_ms,
                run.verify_ms
            );
        }
        if let Some(first) = report.runs.first() {
            println!("  hash: {}", first.hash);
        }
        println!("  engines agree: {}", report.agree);
        println!("  cross-verified: {}", report.cross_verified);
    })?;

    if !(report.agree && report.cross_verified) {
        bail!("Engines disagree");
    }
    Ok(())
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
