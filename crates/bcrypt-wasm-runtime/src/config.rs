//! Configuration types for the guest runtime.
//!
//! This module provides configuration structures for choosing and tuning
//! the execution engine and for bounding each guest instance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which execution engine backs a guest instance.
///
/// Chosen once, ahead of time. There is no automatic fallback from one
/// engine to the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Wasmtime with the Cranelift JIT.
    #[default]
    Production,
    /// The wasmi interpreter. Portable to hosts without a JIT.
    Polyfill,
}

impl EngineKind {
    /// All engine kinds.
    pub const ALL: [EngineKind; 2] = [EngineKind::Production, EngineKind::Polyfill];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Production => "production",
            EngineKind::Polyfill => "polyfill",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" | "wasmtime" => Ok(EngineKind::Production),
            "polyfill" | "wasmi" => Ok(EngineKind::Polyfill),
            other => Err(format!(
                "unknown engine '{}', expected 'production' or 'polyfill'",
                other
            )),
        }
    }
}

/// Cranelift optimisation level for the production engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimisation; fastest compile.
    None,
    /// Optimise for speed.
    #[default]
    Speed,
    /// Optimise for speed and size.
    SpeedAndSize,
}

impl From<OptLevel> for wasmtime::OptLevel {
    fn from(level: OptLevel) -> Self {
        match level {
            OptLevel::None => wasmtime::OptLevel::None,
            OptLevel::Speed => wasmtime::OptLevel::Speed,
            OptLevel::SpeedAndSize => wasmtime::OptLevel::SpeedAndSize,
        }
    }
}

/// Configuration for the production (wasmtime) engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum WASM stack size in bytes.
    ///
    /// Defaults to 1MB.
    pub max_wasm_stack: usize,

    /// Cranelift optimisation level.
    pub opt_level: OptLevel,

    /// Enable debug information in compiled code.
    pub debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_wasm_stack: 1024 * 1024, // 1MB
            opt_level: OptLevel::Speed,
            debug_info: false,
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum WASM stack size.
    pub fn with_max_wasm_stack(mut self, bytes: usize) -> Self {
        self.max_wasm_stack = bytes;
        self
    }

    /// Set the Cranelift optimisation level.
    pub fn with_opt_level(mut self, level: OptLevel) -> Self {
        self.opt_level = level;
        self
    }

    /// Enable debug information.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    /// Trade generated code quality for compile time.
    pub fn fast_compile() -> Self {
        Self {
            opt_level: OptLevel::None,
            ..Self::default()
        }
    }
}

/// Limits applied to a single guest instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceLimits {
    /// Maximum guest linear memory in bytes.
    ///
    /// Defaults to 16MB. Growth past this fails inside the guest allocator.
    pub max_memory_bytes: usize,
}

impl Default for InstanceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl InstanceLimits {
    /// Create limits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum memory limit.
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// A tight cap of four wasm pages.
    pub fn minimal() -> Self {
        Self {
            max_memory_bytes: 4 * 64 * 1024,
        }
    }
}
