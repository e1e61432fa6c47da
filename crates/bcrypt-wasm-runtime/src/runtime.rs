//! The loaded guest handle.

use tracing::info;

use crate::artifact::Artifact;
use crate::config::{EngineKind, InstanceLimits};
use crate::engine::{ExecutionEngine, GuestInstance, InstanceId};
use crate::error::{LoadResult, MemoryResult};
use crate::memory::{BridgeStats, CallScope};

/// A guest instance together with its memory bridge.
///
/// Owns the guest's linear memory exclusively. Every operation on it takes
/// `&mut self`, so two calls can never interleave against the same guest.
/// Share a `Runtime` across threads behind a mutex, or load several.
pub struct Runtime {
    id: InstanceId,
    kind: EngineKind,
    engine_name: &'static str,
    limits: InstanceLimits,
    instance: Box<dyn GuestInstance>,
    stats: BridgeStats,
}

impl Runtime {
    /// Instantiate `artifact` on `engine`.
    ///
    /// This is the one-time setup step. Any failure is fatal; there is no
    /// partially loaded runtime.
    pub fn load(
        engine: &dyn ExecutionEngine,
        artifact: &Artifact,
        limits: &InstanceLimits,
    ) -> LoadResult<Self> {
        let id = InstanceId::new();
        let instance = engine.instantiate(artifact.wasm(), limits)?;

        info!(
            instance_id = %id,
            engine = engine.name(),
            artifact_len = artifact.len(),
            max_memory_bytes = limits.max_memory_bytes,
            "Loaded guest"
        );

        Ok(Self {
            id,
            kind: engine.kind(),
            engine_name: engine.name(),
            limits: limits.clone(),
            instance,
            stats: BridgeStats::default(),
        })
    }

    /// Get the instance ID.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Which engine runs this guest.
    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Name of the engine running this guest.
    pub fn engine_name(&self) -> &'static str {
        self.engine_name
    }

    /// Limits the guest was instantiated with.
    pub fn limits(&self) -> &InstanceLimits {
        &self.limits
    }

    /// Allocation counters for this guest.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Current size of guest linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.instance.memory_size()
    }

    /// Copy bytes out of guest memory without going through a scope.
    ///
    /// For diagnostics only; the bytes may belong to the guest.
    pub fn peek(&self, offset: usize, len: usize) -> MemoryResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.instance.read_memory(offset, &mut buf)?;
        Ok(buf)
    }

    /// Open a scope for one guest operation.
    pub fn scope(&mut self) -> CallScope<'_> {
        CallScope::new(self.instance.as_mut(), &mut self.stats, self.id)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id)
            .field("engine", &self.engine_name)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Instantiate `artifact` on `engine`. See [`Runtime::load`].
pub fn load(
    engine: &dyn ExecutionEngine,
    artifact: &Artifact,
    limits: &InstanceLimits,
) -> LoadResult<Runtime> {
    Runtime::load(engine, artifact, limits)
}
