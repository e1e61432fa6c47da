//! Guest panic propagation.
//!
//! The guest reports an unrecoverable failure by writing a message into a
//! region it allocated itself and calling the imported `env.panic(ptr, len)`.
//! The host side of that import lives in each engine; this module holds the
//! engine-independent parts: the recorded [`GuestPanic`], the per-store
//! [`PanicSlot`] it is parked in, and the conversion of a failed call into a
//! [`CallError`].

use crate::abi::GuestPtr;
use crate::error::{CallError, TrapInfo};

/// A panic reported by the guest through its panic import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestPanic {
    /// The guest's diagnostic message.
    pub message: String,
    /// Where the message lived in guest memory before it was freed.
    pub ptr: GuestPtr,
}

impl GuestPanic {
    /// Decode a panic message copied out of guest memory.
    ///
    /// Invalid UTF-8 is replaced rather than rejected so the diagnostic is
    /// never lost.
    pub fn from_bytes(ptr: GuestPtr, bytes: &[u8]) -> Self {
        Self {
            message: String::from_utf8_lossy(bytes).into_owned(),
            ptr,
        }
    }

    /// The guest's diagnostic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for GuestPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GuestPanic {}

/// Holds the panic raised during the current guest call, if any.
///
/// Stored in each engine's store data. The panic import fills it, the call
/// wrapper drains it.
#[derive(Debug, Default)]
pub struct PanicSlot(Option<GuestPanic>);

impl PanicSlot {
    /// Record a panic. A second panic in the same call keeps the first one.
    pub fn record(&mut self, panic: GuestPanic) {
        if self.0.is_none() {
            self.0 = Some(panic);
        }
    }

    /// Take the recorded panic, leaving the slot empty.
    pub fn take(&mut self) -> Option<GuestPanic> {
        self.0.take()
    }

    /// Check whether a panic is pending.
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

/// Classify a failed guest call.
///
/// A recorded panic always wins over the trap that unwound the call, since
/// the trap is only the guest's way of not returning after the import.
pub fn classify_failure(slot: &mut PanicSlot, trap: TrapInfo) -> CallError {
    match slot.take() {
        Some(panic) => CallError::Panic(panic),
        None => CallError::Trap(trap),
    }
}
