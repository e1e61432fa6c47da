//! Hash command - Hash a password in the sandboxed guest.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use bcrypt_wasm::bcrypt_wasm_runtime::EngineKind;

use super::{HashOptions, emit, parse_engine};
use crate::OutputFormat;
use crate::config::CliConfig;

/// Arguments for the hash command.
#[derive(Args)]
pub struct HashArgs {
    /// Password to hash
    #[arg(required = true)]
    pub password: String,

    #[command(flatten)]
    pub options: HashOptions,

    /// Execution engine (production or polyfill)
    #[arg(short = 'e', long, value_parser = parse_engine)]
    pub engine: Option<EngineKind>,
}

/// Hash result.
#[derive(Debug, Serialize)]
struct HashReport {
    hash: String,
    engine: EngineKind,
    cost: u32,
    version: String,
}

/// Execute the hash command.
pub fn execute(args: HashArgs, config: &CliConfig, format: OutputFormat) -> Result<()> {
    let salt = args.options.salt_bytes()?;
    let params = args.options.params(config);

    let mut bcrypt = config
        .builder(args.engine)
        .build()
        .context("Failed to load bcrypt guest")?;

    tracing::info!(engine = %bcrypt.engine(), cost = params.cost, "Hashing password");

    let hash = bcrypt
        .hash(&args.password, salt.as_deref(), Some(params))
        .context("Failed to hash password")?;

    let report = HashReport {
        hash,
        engine: bcrypt.engine(),
        cost: params.cost,
        version: params.version.to_string(),
    };

    emit(format, &report, |report| println!("{}", report.hash))
}
