//! # bcrypt-wasm - bcrypt in a WebAssembly sandbox
//!
//! bcrypt-wasm hashes and verifies passwords with a bcrypt implementation
//! compiled to WebAssembly and run inside a sandboxed guest. The guest is
//! embedded in this crate at build time.
//!
//! ## Features
//!
//! - **Two engines**: wasmtime (production) or wasmi (polyfill), chosen ahead of time
//! - **Leak-free bridge**: every guest allocation is released, including on panic
//! - **Guest panics as errors**: the guest's own message, not a bare trap
//! - **Sharing**: a mutex-guarded handle or a pool of independent guests
//!
//! ## Quick Start
//!
//! ```ignore
//! use bcrypt_wasm::prelude::*;
//!
//! let mut bcrypt = Bcrypt::builder()
//!     .with_engine(EngineKind::Production)
//!     .with_default_cost(10)
//!     .build()?;
//!
//! let hash = bcrypt.hash("hunter2", None, None)?;
//! assert!(bcrypt.verify("hunter2", &hash)?);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                  bcrypt-wasm (facade)                   │
//! │      BcryptBuilder ── Bcrypt ── SharedBcrypt / Pool     │
//! ├─────────────────────────────────────────────────────────┤
//! │   bcrypt-wasm-runtime (loader, memory bridge, panics)   │
//! ├────────────────────────────┬────────────────────────────┤
//! │          wasmtime          │           wasmi            │
//! ├────────────────────────────┴────────────────────────────┤
//! │                bcrypt guest (wasm32, no_std)            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bundled;
pub mod error;
pub mod hasher;
pub mod params;
pub mod shared;

#[cfg(feature = "async")]
pub mod asynchronous;

use tracing::debug;

use bcrypt_wasm_runtime::{
    Artifact, EngineConfig, EngineKind, ExecutionEngine, InstanceLimits, Runtime,
};

// Re-export from sub-crates
pub use bcrypt_wasm_runtime;

pub use error::{BcryptError, Result};
pub use hasher::Bcrypt;
pub use params::{BcryptParams, BcryptVersion, DEFAULT_COST, SALT_BYTES, Salt};
pub use shared::{BcryptPool, SharedBcrypt};

#[cfg(feature = "async")]
pub use asynchronous::AsyncBcrypt;

impl Bcrypt {
    /// Create a new builder.
    pub fn builder() -> BcryptBuilder {
        BcryptBuilder::new()
    }

    /// Load the bundled guest on the production engine with default settings.
    pub fn new() -> Result<Self> {
        BcryptBuilder::new().build()
    }
}

/// Builder for configuring and loading a [`Bcrypt`] handle.
#[derive(Debug, Clone)]
pub struct BcryptBuilder {
    engine: EngineKind,
    engine_config: EngineConfig,
    limits: InstanceLimits,
    artifact: Option<Artifact>,
    defaults: BcryptParams,
}

impl BcryptBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            engine: EngineKind::default(),
            engine_config: EngineConfig::default(),
            limits: InstanceLimits::default(),
            artifact: None,
            defaults: BcryptParams::default(),
        }
    }

    // Engine

    /// Choose the execution engine.
    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// Set the engine configuration. Only the production engine reads it.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    // Limits

    /// Set the maximum guest memory in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.limits.max_memory_bytes = bytes;
        self
    }

    /// Set all instance limits.
    pub fn with_limits(mut self, limits: InstanceLimits) -> Self {
        self.limits = limits;
        self
    }

    // Guest

    /// Load this artifact instead of the bundled guest.
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    // Defaults

    /// Set the cost used when `hash` is given no parameters.
    pub fn with_default_cost(mut self, cost: u32) -> Self {
        self.defaults.cost = cost;
        self
    }

    /// Set the version used when `hash` is given no parameters.
    pub fn with_default_version(mut self, version: BcryptVersion) -> Self {
        self.defaults.version = version;
        self
    }

    /// Set all default parameters.
    pub fn with_defaults(mut self, defaults: BcryptParams) -> Self {
        self.defaults = defaults;
        self
    }

    /// Load one guest.
    pub fn build(self) -> Result<Bcrypt> {
        let (engine, artifact) = self.prepare()?;
        self.load(engine.as_ref(), &artifact)
    }

    /// Load one guest behind a thread-safe handle.
    pub fn build_shared(self) -> Result<SharedBcrypt> {
        self.build().map(SharedBcrypt::new)
    }

    /// Load `size` independent guests sharing one engine. A size of zero
    /// is treated as one.
    pub fn build_pool(self, size: usize) -> Result<BcryptPool> {
        let (engine, artifact) = self.prepare()?;
        let mut pool = BcryptPool::new(self.load(engine.as_ref(), &artifact)?);
        for _ in 1..size {
            pool.push(self.load(engine.as_ref(), &artifact)?);
        }

        debug!(engine = %self.engine, size = pool.len(), "Built guest pool");
        Ok(pool)
    }

    fn prepare(&self) -> Result<(Box<dyn ExecutionEngine>, Artifact)> {
        let engine = self.engine.engine(&self.engine_config)?;
        let artifact = match &self.artifact {
            Some(artifact) => artifact.clone(),
            None => bundled::bundled_artifact()?,
        };
        Ok((engine, artifact))
    }

    fn load(&self, engine: &dyn ExecutionEngine, artifact: &Artifact) -> Result<Bcrypt> {
        let runtime = Runtime::load(engine, artifact, &self.limits)?;
        Ok(Bcrypt::from_runtime(runtime, self.defaults))
    }
}

impl Default for BcryptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{BcryptError, Result};
    pub use crate::hasher::Bcrypt;
    pub use crate::params::{BcryptParams, BcryptVersion, Salt};
    pub use crate::shared::{BcryptPool, SharedBcrypt};
    pub use crate::BcryptBuilder;
    pub use bcrypt_wasm_runtime::{EngineConfig, EngineKind, InstanceLimits};

    #[cfg(feature = "async")]
    pub use crate::asynchronous::AsyncBcrypt;
}
