//! Error types for the guest runtime.
//!
//! Errors are split by the phase they come from: loading the guest
//! ([`LoadError`]), calling into it ([`CallError`]) and moving bytes across
//! the memory boundary ([`MemoryError`]). [`RuntimeError`] wraps all three.

use thiserror::Error;

use crate::panic::GuestPanic;

/// Top-level error type for runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Error while loading or instantiating the guest.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Error raised by a guest call.
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Error while transferring bytes to or from guest memory.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Errors while turning a bytecode artifact into a running guest.
///
/// All of these are fatal: there is no partially loaded guest.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The artifact could not be decoded into wasm bytecode.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// No artifact was bundled into this build.
    #[error("No bundled guest artifact is available in this build")]
    ArtifactUnavailable,

    /// The execution engine could not be created.
    #[error("Failed to create execution engine: {0}")]
    Engine(String),

    /// The engine rejected the bytecode.
    #[error("Failed to compile guest module: {0}")]
    Compile(String),

    /// Linking or instantiation failed.
    #[error("Failed to instantiate guest module: {0}")]
    Instantiate(String),

    /// A required export is absent or has the wrong type.
    #[error("Guest module is missing required export '{name}'")]
    MissingExport {
        /// The export name.
        name: &'static str,
    },

    /// IO error reading the artifact.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while a guest entry point runs.
#[derive(Debug, Error)]
pub enum CallError {
    /// The guest reported an unrecoverable condition through its panic import.
    #[error("Guest panicked: {0}")]
    Panic(GuestPanic),

    /// The guest trapped without reporting a message.
    #[error("Guest trapped: {0}")]
    Trap(#[from] TrapInfo),

    /// A memory transfer needed by the call failed.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl CallError {
    /// The guest's panic, if this call ended in one.
    pub fn as_panic(&self) -> Option<&GuestPanic> {
        match self {
            CallError::Panic(panic) => Some(panic),
            _ => None,
        }
    }
}

/// Errors moving bytes across the host/guest boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The guest allocator returned a null pointer.
    #[error("Guest allocation of {len} bytes failed")]
    AllocationFailed {
        /// Requested length.
        len: u32,
    },

    /// Access past the end of guest linear memory.
    #[error("Memory access out of bounds: offset={offset}, len={len}, memory_size={memory_size}")]
    OutOfBounds {
        /// The offset attempted.
        offset: usize,
        /// The length attempted.
        len: usize,
        /// The memory size at the time of the access.
        memory_size: usize,
    },

    /// The region is not owned by the current call scope.
    #[error("Region at {ptr:#x} is not owned by this call")]
    RegionNotOwned {
        /// Region base pointer.
        ptr: u32,
    },

    /// A read or write larger than the region it targets.
    #[error("Region at {ptr:#x} holds {capacity} bytes, {requested} requested")]
    RegionTooSmall {
        /// Region base pointer.
        ptr: u32,
        /// Region length.
        capacity: u32,
        /// Bytes requested.
        requested: usize,
    },
}

/// Information about a guest trap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapInfo {
    /// The trap code name, if available.
    pub code: Option<String>,
    /// Human-readable trap message.
    pub message: String,
}

impl TrapInfo {
    /// Create trap info from a bare message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TrapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for TrapInfo {}

impl From<wasmtime::Trap> for TrapInfo {
    fn from(trap: wasmtime::Trap) -> Self {
        Self {
            code: Some(format!("{:?}", trap)),
            message: trap.to_string(),
        }
    }
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Result type alias for load operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Result type alias for guest calls.
pub type CallResult<T> = std::result::Result<T, CallError>;

/// Result type alias for memory transfers.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
