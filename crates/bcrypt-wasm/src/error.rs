//! Error types for bcrypt-wasm.

use thiserror::Error;

use bcrypt_wasm_runtime::{CallError, GuestPanic, LoadError, MemoryError, RuntimeError};

/// Errors from hashing and verification.
#[derive(Debug, Error)]
pub enum BcryptError {
    /// The salt is not 16 bytes. Raised before the guest is touched.
    #[error("Invalid salt length: expected {expected} bytes, got {actual}")]
    InvalidSaltLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// Unknown version string.
    #[error("Invalid bcrypt version '{0}', expected one of 2a, 2x, 2y, 2b")]
    InvalidVersion(String),

    /// The guest reported more output than the output region holds.
    #[error("Guest reported {len} output bytes, capacity is {capacity}")]
    OutputOverflow {
        /// Reported length.
        len: usize,
        /// Output region capacity.
        capacity: usize,
    },

    /// The guest produced an encoded hash that is not UTF-8.
    #[error("Guest output is not valid UTF-8: {0}")]
    InvalidOutput(#[from] std::string::FromUtf8Error),

    /// Loading or calling the guest failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The blocking task running a call was cancelled before it finished.
    #[error("Guest call was cancelled")]
    Cancelled,
}

impl BcryptError {
    /// The guest's panic, if this error is one.
    pub fn guest_panic(&self) -> Option<&GuestPanic> {
        match self {
            BcryptError::Runtime(RuntimeError::Call(err)) => err.as_panic(),
            _ => None,
        }
    }

    /// Whether the guest trapped without a message.
    pub fn is_trap(&self) -> bool {
        matches!(self, BcryptError::Runtime(RuntimeError::Call(CallError::Trap(_))))
    }
}

impl From<LoadError> for BcryptError {
    fn from(err: LoadError) -> Self {
        BcryptError::Runtime(err.into())
    }
}

impl From<CallError> for BcryptError {
    fn from(err: CallError) -> Self {
        BcryptError::Runtime(err.into())
    }
}

impl From<MemoryError> for BcryptError {
    fn from(err: MemoryError) -> Self {
        BcryptError::Runtime(err.into())
    }
}

/// Result type alias for bcrypt-wasm operations.
pub type Result<T> = std::result::Result<T, BcryptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layered_conversions() {
        let err: BcryptError = LoadError::ArtifactUnavailable.into();
        assert!(matches!(err, BcryptError::Runtime(RuntimeError::Load(_))));

        let err: BcryptError = MemoryError::RegionNotOwned { ptr: 8 }.into();
        assert!(err.to_string().contains("not owned"));
        assert!(err.guest_panic().is_none());
    }

    #[test]
    fn test_guest_panic_accessor() {
        let panic = GuestPanic::from_bytes(1024, b"Failed to verify hash: InvalidHash");
        let err: BcryptError = CallError::Panic(panic).into();
        assert_eq!(
            err.guest_panic().map(|p| p.message()),
            Some("Failed to verify hash: InvalidHash")
        );
        assert!(!err.is_trap());
    }
}
