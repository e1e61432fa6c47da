//! The guest module ABI.
//!
//! A conforming guest exports a growable linear memory plus four functions
//! and imports a single panic callback:
//!
//! ```text
//! (export "memory"  (memory ..))
//! (export "alloc"   (func (param $size i32) (result i32)))
//! (export "dealloc" (func (param $ptr i32) (param $size i32)))
//! (export "hash"    (func (param i32 i32 i32 i32 i32 i32 i32 i32 i32)))
//! (export "verify"  (func (param i32 i32 i32 i32 i32)))
//! (import "env" "panic" (func (param $ptr i32) (param $len i32)))
//! ```
//!
//! Pointers and lengths are wasm32 `i32` values and are bit-reinterpreted as
//! `u32` on the host side.

/// Offset into guest linear memory.
pub type GuestPtr = u32;

/// Import module of the panic callback.
pub const IMPORT_MODULE: &str = "env";
/// Name of the panic callback import.
pub const IMPORT_PANIC: &str = "panic";

/// Exported linear memory.
pub const EXPORT_MEMORY: &str = "memory";
/// Exported allocator entry point.
pub const EXPORT_ALLOC: &str = "alloc";
/// Exported deallocator entry point.
pub const EXPORT_DEALLOC: &str = "dealloc";
/// Exported hashing entry point.
pub const EXPORT_HASH: &str = "hash";
/// Exported verification entry point.
pub const EXPORT_VERIFY: &str = "verify";

/// Wasm `i32` parameters of the `hash` export, in order.
pub type HashParams = (i32, i32, i32, i32, i32, i32, i32, i32, i32);
/// Wasm `i32` parameters of the `verify` export, in order.
pub type VerifyParams = (i32, i32, i32, i32, i32);

/// Arguments to the guest `hash` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashArgs {
    /// Password bytes.
    pub password_ptr: GuestPtr,
    /// Password length.
    pub password_len: u32,
    /// Salt bytes.
    pub salt_ptr: GuestPtr,
    /// Salt length.
    pub salt_len: u32,
    /// Output buffer the encoded hash is written into.
    pub output_ptr: GuestPtr,
    /// Capacity of the output buffer.
    pub output_cap: u32,
    /// Where the guest stores the actual output length (u32, little-endian).
    pub output_len_ptr: GuestPtr,
    /// ASCII letter of the version (`b'a'`, `b'x'`, `b'y'`, `b'b'`).
    pub version_tag: u8,
    /// Work factor, forwarded uninterpreted.
    pub cost: u32,
}

impl HashArgs {
    /// Lower to the wasm parameter tuple.
    pub fn to_params(&self) -> HashParams {
        (
            self.password_ptr as i32,
            self.password_len as i32,
            self.salt_ptr as i32,
            self.salt_len as i32,
            self.output_ptr as i32,
            self.output_cap as i32,
            self.output_len_ptr as i32,
            i32::from(self.version_tag),
            self.cost as i32,
        )
    }
}

/// Arguments to the guest `verify` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyArgs {
    /// Password bytes.
    pub password_ptr: GuestPtr,
    /// Password length.
    pub password_len: u32,
    /// UTF-8 bytes of the encoded hash.
    pub hash_ptr: GuestPtr,
    /// Encoded hash length.
    pub hash_len: u32,
    /// Where the guest stores the match byte.
    pub matches_ptr: GuestPtr,
}

impl VerifyArgs {
    /// Lower to the wasm parameter tuple.
    pub fn to_params(&self) -> VerifyParams {
        (
            self.password_ptr as i32,
            self.password_len as i32,
            self.hash_ptr as i32,
            self.hash_len as i32,
            self.matches_ptr as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_args_lowering() {
        let args = HashArgs {
            password_ptr: 1024,
            password_len: 8,
            salt_ptr: 2048,
            salt_len: 16,
            output_ptr: 4096,
            output_cap: 100,
            output_len_ptr: 8192,
            version_tag: b'b',
            cost: 10,
        };

        assert_eq!(
            args.to_params(),
            (1024, 8, 2048, 16, 4096, 100, 8192, 98, 10)
        );
    }

    #[test]
    fn test_high_pointers_reinterpret() {
        let args = VerifyArgs {
            password_ptr: 0x8000_0000,
            password_len: 1,
            hash_ptr: 0xffff_fff0,
            hash_len: 2,
            matches_ptr: 3,
        };

        let (password_ptr, _, hash_ptr, _, _) = args.to_params();
        assert_eq!(password_ptr as u32, 0x8000_0000);
        assert_eq!(hash_ptr as u32, 0xffff_fff0);
    }
}
