//! Subcommands and the arguments they share.

pub mod compare;
pub mod hash;
pub mod verify;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;

use bcrypt_wasm::bcrypt_wasm_runtime::EngineKind;
use bcrypt_wasm::{BcryptParams, BcryptVersion, SALT_BYTES};

use crate::OutputFormat;
use crate::config::CliConfig;

/// Salt and work-factor options for commands that hash.
#[derive(Args, Debug, Default)]
pub struct HashOptions {
    /// Salt as 16 bytes of text (random if omitted)
    #[arg(long, conflicts_with = "salt_hex")]
    pub salt: Option<String>,

    /// Salt as 32 hex digits
    #[arg(long)]
    pub salt_hex: Option<String>,

    /// Work factor
    #[arg(short = 'c', long)]
    pub cost: Option<u32>,

    /// Hash format version (2a, 2x, 2y, 2b)
    #[arg(long = "version", value_parser = parse_version)]
    pub bcrypt_version: Option<BcryptVersion>,
}

impl HashOptions {
    /// Decode the salt flags. `None` means draw a random salt.
    pub fn salt_bytes(&self) -> Result<Option<Vec<u8>>> {
        let bytes = match (&self.salt, &self.salt_hex) {
            (Some(text), _) => text.as_bytes().to_vec(),
            (None, Some(digits)) => hex::decode(digits).context("Salt is not valid hex")?,
            (None, None) => return Ok(None),
        };

        if bytes.len() != SALT_BYTES {
            bail!("Salt must be {} bytes, got {}", SALT_BYTES, bytes.len());
        }
        Ok(Some(bytes))
    }

    /// Parameters from flags, falling back to the config file and then the
    /// built-in defaults.
    pub fn params(&self, config: &CliConfig) -> BcryptParams {
        let defaults = BcryptParams::default();
        BcryptParams {
            version: self
                .bcrypt_version
                .or(config.default_version)
                .unwrap_or(defaults.version),
            cost: self.cost.or(config.default_cost).unwrap_or(defaults.cost),
        }
    }
}

/// Parse an engine name for clap.
pub fn parse_engine(s: &str) -> Result<EngineKind, String> {
    s.parse()
}

/// Parse a version string for clap.
pub fn parse_version(s: &str) -> Result<BcryptVersion, String> {
    s.parse().map_err(|e: bcrypt_wasm::BcryptError| e.to_string())
}

/// Print `value` as JSON, or run `human` for the human format.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::JsonCompact => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_flags() {
        let options = HashOptions {
            salt: Some("saltsaltsaltsalt".to_string()),
            ..Default::default()
        };
        assert_eq!(options.salt_bytes().unwrap().unwrap(), b"saltsaltsaltsalt");

        let options = HashOptions {
            salt_hex: Some("000102030405060708090a0b0c0d0e0f".to_string()),
            ..Default::default()
        };
        assert_eq!(options.salt_bytes().unwrap().unwrap(), (0u8..16).collect::<Vec<_>>());

        assert!(HashOptions::default().salt_bytes().unwrap().is_none());
    }

    #[test]
    fn test_bad_salt_flags() {
        let options = HashOptions {
            salt: Some("short".to_string()),
            ..Default::default()
        };
        assert!(options.salt_bytes().is_err());

        let options = HashOptions {
            salt_hex: Some("zz".to_string()),
            ..Default::default()
        };
        assert!(options.salt_bytes().is_err());
    }

    #[test]
    fn test_params_precedence() {
        let config = CliConfig {
            default_cost: Some(8),
            default_version: Some(BcryptVersion::TwoA),
            ..Default::default()
        };

        let options = HashOptions::default();
        assert_eq!(options.params(&CliConfig::default()), BcryptParams::default());
        assert_eq!(
            options.params(&config),
            BcryptParams { version: BcryptVersion::TwoA, cost: 8 }
        );

        let options = HashOptions {
            cost: Some(5),
            ..Default::default()
        };
        assert_eq!(options.params(&config).cost, 5);
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_engine("wasmi"), Ok(EngineKind::Polyfill));
        assert!(parse_engine("v8").is_err());
        assert_eq!(parse_version("2x"), Ok(BcryptVersion::TwoX));
        assert!(parse_version("3").unwrap_err().contains("Invalid bcrypt version"));
    }
}
