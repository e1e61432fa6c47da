//! Sharing handles across threads.
//!
//! A guest runs one call at a time. [`SharedBcrypt`] serializes callers on a
//! mutex around a single handle; [`BcryptPool`] spreads callers over several
//! independently loaded handles, each with its own guest memory, so calls on
//! different slots run in parallel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use bcrypt_wasm_runtime::BridgeStats;

use crate::error::Result;
use crate::hasher::Bcrypt;
use crate::params::BcryptParams;

/// A clonable, thread-safe handle to one guest.
#[derive(Clone)]
pub struct SharedBcrypt {
    inner: Arc<Mutex<Bcrypt>>,
}

impl SharedBcrypt {
    /// Wrap a handle.
    pub fn new(bcrypt: Bcrypt) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bcrypt)),
        }
    }

    /// See [`Bcrypt::hash`]. Blocks while another caller holds the guest.
    pub fn hash(
        &self,
        password: impl AsRef<[u8]>,
        salt: Option<&[u8]>,
        params: Option<BcryptParams>,
    ) -> Result<String> {
        self.inner.lock().hash(password, salt, params)
    }

    /// See [`Bcrypt::verify`]. Blocks while another caller holds the guest.
    pub fn verify(&self, password: impl AsRef<[u8]>, hash: &str) -> Result<bool> {
        self.inner.lock().verify(password, hash)
    }

    /// Take exclusive access to the handle.
    pub fn lock(&self) -> MutexGuard<'_, Bcrypt> {
        self.inner.lock()
    }

    /// Guest allocation counters.
    pub fn stats(&self) -> BridgeStats {
        self.inner.lock().stats()
    }
}

impl From<Bcrypt> for SharedBcrypt {
    fn from(bcrypt: Bcrypt) -> Self {
        Self::new(bcrypt)
    }
}

impl std::fmt::Debug for SharedBcrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBcrypt")
            .field("strong_count", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// Several guests behind one handle, dispatched round-robin.
pub struct BcryptPool {
    slots: Vec<SharedBcrypt>,
    next: AtomicUsize,
}

impl BcryptPool {
    /// A pool of one.
    pub fn new(first: Bcrypt) -> Self {
        Self {
            slots: vec![SharedBcrypt::new(first)],
            next: AtomicUsize::new(0),
        }
    }

    /// Add a guest to the rotation.
    pub fn push(&mut self, bcrypt: Bcrypt) {
        self.slots.push(SharedBcrypt::new(bcrypt));
    }

    /// Build a pool from loaded handles. `None` if `handles` is empty.
    pub fn from_handles(handles: Vec<Bcrypt>) -> Option<Self> {
        if handles.is_empty() {
            return None;
        }
        Some(Self {
            slots: handles.into_iter().map(SharedBcrypt::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    /// Number of guests in the pool.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a pool holds at least one guest.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot the next call goes to.
    pub fn next_slot(&self) -> &SharedBcrypt {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        &self.slots[index]
    }

    /// See [`Bcrypt::hash`].
    pub fn hash(
        &self,
        password: impl AsRef<[u8]>,
        salt: Option<&[u8]>,
        params: Option<BcryptParams>,
    ) -> Result<String> {
        self.next_slot().hash(password, salt, params)
    }

    /// See [`Bcrypt::verify`].
    pub fn verify(&self, password: impl AsRef<[u8]>, hash: &str) -> Result<bool> {
        self.next_slot().verify(password, hash)
    }

    /// Allocation counters of every slot.
    pub fn stats(&self) -> Vec<BridgeStats> {
        self.slots.iter().map(SharedBcrypt::stats).collect()
    }
}

impl std::fmt::Debug for BcryptPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcryptPool")
            .field("slots", &self.slots.len())
            .finish()
    }
}
