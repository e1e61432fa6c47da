//! Verify command - Check a password against a bcrypt hash.

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;

use bcrypt_wasm::bcrypt_wasm_runtime::EngineKind;

use super::{emit, parse_engine};
use crate::OutputFormat;
use crate::config::CliConfig;

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Password to check
    #[arg(required = true)]
    pub password: String,

    /// Encoded bcrypt hash
    #[arg(required = true)]
    pub hash: String,

    /// Execution engine (production or polyfill)
    #[arg(short = 'e', long, value_parser = parse_engine)]
    pub engine: Option<EngineKind>,
}

/// Verification result.
#[derive(Debug, Serialize)]
struct VerifyReport {
    matches: bool,
    engine: EngineKind,
}

/// Execute the verify command. A mismatch is reported and then returned as
/// an error so the process exits non-zero.
pub fn execute(args: VerifyArgs, config: &CliConfig, format: OutputFormat) -> Result<()> {
    let mut bcrypt = config
        .builder(args.engine)
        .build()
        .context("Failed to load bcrypt guest")?;

    let matches = bcrypt
        .verify(&args.password, &args.hash)
        .context("Failed to verify hash")?;

    let report = VerifyReport {
        matches,
        engine: bcrypt.engine(),
    };
    emit(format, &report, |report| println!("{}", report.matches))?;

    if !matches {
        bail!("Password does not match");
    }
    Ok(())
}
