//! Execution engine abstraction.
//!
//! The loader only ever talks to the two traits in this module. An
//! [`ExecutionEngine`] turns wasm bytecode into a [`GuestInstance`]; the
//! instance exposes the guest ABI as plain Rust calls. Both the production
//! engine (wasmtime) and the polyfill engine (wasmi) implement them, and
//! nothing outside their own modules depends on either concrete type.

use uuid::Uuid;

use crate::abi::{GuestPtr, HashArgs, VerifyArgs};
use crate::config::{EngineConfig, EngineKind, InstanceLimits};
use crate::error::{CallResult, LoadResult, MemoryResult};
use crate::wasmi_engine::PolyfillEngine;
use crate::wasmtime_engine::ProductionEngine;

/// Unique identifier for a loaded guest instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Create a new random instance ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that can instantiate guest bytecode.
pub trait ExecutionEngine: Send + Sync {
    /// Human-readable engine name.
    fn name(&self) -> &'static str;

    /// Which engine family this is.
    fn kind(&self) -> EngineKind;

    /// Compile and instantiate `wasm`, wiring up the panic import.
    ///
    /// Required exports are checked here. A module that compiles but does not
    /// satisfy the guest ABI is rejected.
    fn instantiate(
        &self,
        wasm: &[u8],
        limits: &InstanceLimits,
    ) -> LoadResult<Box<dyn GuestInstance>>;
}

/// A running guest, reduced to its ABI.
///
/// Implementations hold the engine store. Memory is looked up from the store
/// on every access rather than cached, since any guest call may grow it.
pub trait GuestInstance: Send {
    /// Call the guest `alloc` export. A null result is returned as-is.
    fn alloc(&mut self, len: u32) -> CallResult<GuestPtr>;

    /// Call the guest `dealloc` export.
    fn dealloc(&mut self, ptr: GuestPtr, len: u32) -> CallResult<()>;

    /// Call the guest `hash` export.
    fn hash(&mut self, args: HashArgs) -> CallResult<()>;

    /// Call the guest `verify` export.
    fn verify(&mut self, args: VerifyArgs) -> CallResult<()>;

    /// Copy `buf.len()` bytes at `offset` out of guest memory.
    fn read_memory(&self, offset: usize, buf: &mut [u8]) -> MemoryResult<()>;

    /// Copy `data` into guest memory at `offset`.
    fn write_memory(&mut self, offset: usize, data: &[u8]) -> MemoryResult<()>;

    /// Current size of guest linear memory in bytes.
    fn memory_size(&self) -> usize;
}

impl EngineKind {
    /// Create the engine of this kind.
    ///
    /// `config` tunes the production engine; the polyfill engine has nothing
    /// to tune and ignores it.
    pub fn engine(&self, config: &EngineConfig) -> LoadResult<Box<dyn ExecutionEngine>> {
        match self {
            EngineKind::Production => Ok(Box::new(ProductionEngine::new(config.clone())?)),
            EngineKind::Polyfill => Ok(Box::new(PolyfillEngine::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_unique() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_engine_selection() {
        for kind in EngineKind::ALL {
            let engine = kind.engine(&EngineConfig::fast_compile()).unwrap();
            assert_eq!(engine.kind(), kind);
        }
    }
}
