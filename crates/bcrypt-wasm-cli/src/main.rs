//! bcrypt-wasm CLI - Hash and verify passwords in a WebAssembly sandbox.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

/// Sandboxed bcrypt password hashing
#[derive(Parser)]
#[command(name = "bcrypt-wasm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Output format options.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Hash a password
    Hash(commands::hash::HashArgs),
    /// Verify a password against a hash
    Verify(commands::verify::VerifyArgs),
    /// Hash on both engines and compare output and timings
    Compare(commands::compare::CompareArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "bcrypt_wasm={0},bcrypt_wasm_runtime={0},bcrypt_wasm_cli={0}",
            log_level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = config::CliConfig::load(cli.config.as_deref()).and_then(|config| {
        match cli.command {
            Commands::Hash(args) => commands::hash::execute(args, &config, cli.format),
            Commands::Verify(args) => commands::verify::execute(args, &config, cli.format),
            Commands::Compare(args) => commands::compare::execute(args, &config, cli.format),
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcrypt_wasm::BcryptVersion;
    use bcrypt_wasm::bcrypt_wasm_runtime::EngineKind;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hash() {
        let cli = Cli::try_parse_from([
            "bcrypt-wasm",
            "hash",
            "password",
            "--salt",
            "saltsaltsaltsalt",
            "--cost",
            "10",
            "--version",
            "2y",
            "--engine",
            "polyfill",
            "-f",
            "json",
        ])
        .unwrap();

        assert!(matches!(cli.format, OutputFormat::Json));
        let Commands::Hash(args) = cli.command else {
            panic!("expected hash command");
        };
        assert_eq!(args.password, "password");
        assert_eq!(args.options.cost, Some(10));
        assert_eq!(args.options.bcrypt_version, Some(BcryptVersion::TwoY));
        assert_eq!(args.engine, Some(EngineKind::Polyfill));
    }

    #[test]
    fn test_salt_flags_conflict() {
        let result = Cli::try_parse_from([
            "bcrypt-wasm",
            "hash",
            "password",
            "--salt",
            "saltsaltsaltsalt",
            "--salt-hex",
            "00",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_verify_and_compare() {
        let cli = Cli::try_parse_from(["bcrypt-wasm", "-vv", "verify", "pw", "$2b$04$abc"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Verify(ref args) if args.hash == "$2b$04$abc"));

        let cli = Cli::try_parse_from(["bcrypt-wasm", "compare", "pw", "-c", "4", "-q"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Compare(ref args) if args.options.cost == Some(4)));

        assert!(Cli::try_parse_from(["bcrypt-wasm", "hash", "pw", "--version", "3"]).is_err());
    }
}
