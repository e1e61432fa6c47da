//! bcrypt-wasm runtime - sandboxed guest loader and memory bridge
//!
//! This crate runs a guest module that implements the bcrypt guest ABI and
//! moves bytes across its memory boundary safely. It knows the ABI, not
//! bcrypt: parameter handling lives in the `bcrypt-wasm` crate.
//!
//! - [`ExecutionEngine`] / [`GuestInstance`]: the backend abstraction, with a
//!   production engine (wasmtime) and a polyfill engine (wasmi)
//! - [`Artifact`]: guest bytecode, raw or lz4-compressed
//! - [`Runtime`]: a loaded guest and its allocation counters
//! - [`CallScope`]: scoped guest allocations, released on every exit path
//! - [`GuestPanic`]: messages the guest reports through its panic import
//!
//! # Quick Start
//!
//! ```ignore
//! use bcrypt_wasm_runtime::prelude::*;
//!
//! let engine = EngineKind::Production.engine(&EngineConfig::default())?;
//! let artifact = Artifact::from_file("bcrypt_guest.wasm.lz4")?;
//! let mut runtime = load(engine.as_ref(), &artifact, &InstanceLimits::default())?;
//!
//! let mut scope = runtime.scope();
//! let password = scope.transfer(b"password")?;
//! // ... call into the guest, read results ...
//! scope.finish()?;
//! ```
//!
//! # Memory Model
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           bcrypt-wasm (facade)          │
//! ├─────────────────────────────────────────┤
//! │  Runtime ── CallScope (region ledger)   │
//! ├─────────────────────────────────────────┤
//! │     GuestInstance (alloc/dealloc/...)   │
//! ├────────────────────┬────────────────────┤
//! │      wasmtime      │       wasmi        │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! The guest's linear memory is single-threaded and not reentrant. A
//! [`Runtime`] is only usable through `&mut self`, which serializes calls.

pub mod abi;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod panic;
pub mod runtime;
pub mod wasmi_engine;
pub mod wasmtime_engine;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types at crate root
pub use abi::{GuestPtr, HashArgs, VerifyArgs};
pub use artifact::Artifact;
pub use config::{EngineConfig, EngineKind, InstanceLimits, OptLevel};
pub use engine::{ExecutionEngine, GuestInstance, InstanceId};
pub use error::{
    CallError, CallResult, LoadError, LoadResult, MemoryError, MemoryResult, Result,
    RuntimeError, TrapInfo,
};
pub use memory::{BridgeStats, CallScope, GuestRegion};
pub use panic::GuestPanic;
pub use runtime::{Runtime, load};
pub use wasmi_engine::PolyfillEngine;
pub use wasmtime_engine::ProductionEngine;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::artifact::Artifact;
    pub use crate::config::{EngineConfig, EngineKind, InstanceLimits};
    pub use crate::engine::ExecutionEngine;
    pub use crate::error::{CallError, LoadError, MemoryError, RuntimeError};
    pub use crate::memory::{CallScope, GuestRegion};
    pub use crate::runtime::{Runtime, load};
}
