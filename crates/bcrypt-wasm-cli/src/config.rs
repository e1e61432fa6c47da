//! Optional TOML configuration file.
//!
//! ```toml
//! engine = "polyfill"
//! default_cost = 10
//! default_version = "2y"
//! max_memory_bytes = 8388608
//! ```
//!
//! Command-line flags take precedence over anything set here.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use bcrypt_wasm::bcrypt_wasm_runtime::EngineKind;
use bcrypt_wasm::{BcryptBuilder, BcryptVersion};

/// Settings read from `--config`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Engine used when `--engine` is not given.
    pub engine: Option<EngineKind>,
    /// Cost used when `--cost` is not given.
    pub default_cost: Option<u32>,
    /// Version used when `--version` is not given.
    pub default_version: Option<BcryptVersion>,
    /// Guest memory cap in bytes.
    pub max_memory_bytes: Option<usize>,
}

impl CliConfig {
    /// Read the file at `path`, or return an empty config when there is none.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// A builder seeded from this config, with `engine` overriding the file.
    pub fn builder(&self, engine: Option<EngineKind>) -> BcryptBuilder {
        let mut builder = BcryptBuilder::new();

        if let Some(engine) = engine.or(self.engine) {
            builder = builder.with_engine(engine);
        }
        if let Some(cost) = self.default_cost {
            builder = builder.with_default_cost(cost);
        }
        if let Some(version) = self.default_version {
            builder = builder.with_default_version(version);
        }
        if let Some(bytes) = self.max_memory_bytes {
            builder = builder.with_memory_limit(bytes);
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = CliConfig::parse(
            r#"
            engine = "polyfill"
            default_cost = 10
            default_version = "2y"
            max_memory_bytes = 8388608
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            CliConfig {
                engine: Some(EngineKind::Polyfill),
                default_cost: Some(10),
                default_version: Some(BcryptVersion::TwoY),
                max_memory_bytes: Some(8 * 1024 * 1024),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
        assert!(CliConfig::parse("fuel = 10").is_err());
        assert!(CliConfig::parse("default_version = \"2c\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());

        let path = std::env::temp_dir().join(format!(
            "bcrypt-wasm-cli-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "default_cost = 6\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.default_cost, Some(6));
        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
