//! The bcrypt engine as a wasm32 guest.
//!
//! Exports the allocator and the `hash`/`verify` entry points of the guest
//! ABI. Anything unrecoverable is reported through the imported
//! `env.panic(ptr, len)`: the message is copied into a region from `alloc`,
//! which the host frees, and the call then traps.
//!
//! A trap does not unwind, so nothing owned by a failing call is ever
//! dropped after the signal. Every error path drops its values first and
//! then hands over only the message.

#![no_std]

extern crate alloc;

use alloc::alloc::{handle_alloc_error, Layout};
use alloc::format;
use alloc::string::String;
use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

#[global_allocator]
static ALLOCATOR: dlmalloc::GlobalDlmalloc = dlmalloc::GlobalDlmalloc;

fn no_entropy(_buf: &mut [u8]) -> Result<(), getrandom::Error> {
    Err(getrandom::Error::UNSUPPORTED)
}

getrandom::register_custom_getrandom!(no_entropy);

#[link(wasm_import_module = "env")]
extern "C" {
    #[link_name = "panic"]
    fn host_panic(ptr: *const u8, len: usize);
}

static PANICKING: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn on_panic(info: &core::panic::PanicInfo) -> ! {
    // A panic while reporting a panic (e.g. the allocator is exhausted) has
    // nowhere left to go.
    if PANICKING.swap(true, Ordering::SeqCst) {
        core::arch::wasm32::unreachable();
    }

    let mut message = String::new();
    let _ = write!(message, "{}", info.message());
    signal(message)
}

/// Hand `message` to the host and trap. The caller must already have
/// dropped everything else it owns.
fn signal(message: String) -> ! {
    PANICKING.store(true, Ordering::SeqCst);

    unsafe {
        let len = message.len();
        let ptr = allocate(len);
        core::ptr::copy_nonoverlapping(message.as_ptr(), ptr, len);
        drop(message);
        host_panic(ptr, len);
    }

    core::arch::wasm32::unreachable()
}

fn layout(size: usize) -> Layout {
    match Layout::from_size_align(size.max(1), core::mem::align_of::<usize>()) {
        Ok(layout) => layout,
        Err(_) => core::arch::wasm32::unreachable(),
    }
}

unsafe fn allocate(size: usize) -> *mut u8 {
    let layout = layout(size);
    let ptr = alloc::alloc::alloc(layout);
    if ptr.is_null() {
        handle_alloc_error(layout);
    }
    ptr
}

/// Allocate `size` bytes, aligned for `usize`. Zero is rounded up to one.
#[no_mangle]
pub unsafe extern "C" fn alloc(size: usize) -> *mut u8 {
    PANICKING.store(false, Ordering::SeqCst);
    allocate(size)
}

/// Free a region returned by [`alloc`] with the same `size`.
#[no_mangle]
pub unsafe extern "C" fn dealloc(ptr: *mut u8, size: usize) {
    alloc::alloc::dealloc(ptr, layout(size));
}

fn version_from_tag(tag: u32) -> bcrypt::Version {
    match u8::try_from(tag) {
        Ok(b'a') => bcrypt::Version::TwoA,
        Ok(b'x') => bcrypt::Version::TwoX,
        Ok(b'y') => bcrypt::Version::TwoY,
        Ok(b'b') => bcrypt::Version::TwoB,
        _ => panic!("Invalid version: {}", tag),
    }
}

/// Hash a password with an explicit salt and write the encoded hash.
///
/// The encoded length is written as a little-endian `u32` at `output_len_ptr`.
#[no_mangle]
pub unsafe extern "C" fn hash(
    password_ptr: *const u8,
    password_len: usize,
    salt_ptr: *const u8,
    salt_len: usize,
    output_ptr: *mut u8,
    output_cap: usize,
    output_len_ptr: *mut u8,
    version: u32,
    cost: u32,
) {
    PANICKING.store(false, Ordering::SeqCst);

    let password = core::slice::from_raw_parts(password_ptr, password_len);
    let salt = core::slice::from_raw_parts(salt_ptr, salt_len);
    let output = core::slice::from_raw_parts_mut(output_ptr, output_cap);

    let salt: [u8; 16] = match salt.try_into() {
        Ok(salt) => salt,
        Err(_) => panic!("Salt is not 16 bytes long"),
    };
    let version = version_from_tag(version);

    let encoded = match bcrypt::hash_with_salt(password, cost, salt) {
        Ok(parts) => parts.format_for_version(version),
        Err(err) => {
            let message = format!("Failed to hash password: {:?}", err);
            drop(err);
            signal(message)
        }
    };

    if encoded.len() > output_cap {
        drop(encoded);
        signal(String::from("Output buffer too small"));
    }

    output[..encoded.len()].copy_from_slice(encoded.as_bytes());
    core::ptr::copy_nonoverlapping(
        (encoded.len() as u32).to_le_bytes().as_ptr(),
        output_len_ptr,
        4,
    );
}

/// Check a password against an encoded hash and write 1 or 0 at `matches_ptr`.
#[no_mangle]
pub unsafe extern "C" fn verify(
    password_ptr: *const u8,
    password_len: usize,
    hash_ptr: *const u8,
    hash_len: usize,
    matches_ptr: *mut u8,
) {
    PANICKING.store(false, Ordering::SeqCst);

    let password = core::slice::from_raw_parts(password_ptr, password_len);
    let encoded = core::slice::from_raw_parts(hash_ptr, hash_len);
    let encoded = match core::str::from_utf8(encoded) {
        Ok(encoded) => encoded,
        Err(_) => panic!("Hash is invalid UTF-8"),
    };

    let matches = match bcrypt::verify(password, encoded) {
        Ok(matches) => matches,
        Err(err) => {
            let message = format!("Failed to verify hash: {:?}", err);
            drop(err);
            signal(message)
        }
    };

    matches_ptr.write(u8::from(matches));
}
