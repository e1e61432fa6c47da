//! A mock guest for exercising the bridge without the real bcrypt engine.
//!
//! The mock speaks the full guest ABI. Its `hash` writes the version byte,
//! the salt and the password back to back; its `verify` checks that layout.
//! It keeps a count of live allocations at guest address 0 so tests can
//! observe leaks from inside the guest.

use crate::artifact::Artifact;
use crate::runtime::Runtime;

/// Costs above this make the mock panic through the import.
pub const MOCK_MAX_COST: u32 = 31;

/// This cost makes the mock hit a bare `unreachable` with no message.
pub const MOCK_TRAP_COST: u32 = 99;

/// Panic message for an out-of-range cost.
pub const MOCK_COST_MESSAGE: &str = "cost out of range";

/// Panic message for an empty hash string.
pub const MOCK_EMPTY_HASH_MESSAGE: &str = "empty hash";

/// Bytes the mock prepends to the password in its output.
pub const MOCK_PREFIX_LEN: usize = 17;

/// The mock guest in text format.
pub const MOCK_GUEST_WAT: &str = r#"
(module
  (import "env" "panic" (func $panic (param i32 i32)))

  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))

  (data (i32.const 16) "cost out of range")
  (data (i32.const 64) "empty hash")
  (data (i32.const 96) "output buffer too small")

  (func $alloc (export "alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (if (i32.eqz (local.get $size))
      (then (local.set $size (i32.const 1))))
    (local.set $ptr (global.get $heap))
    (local.set $end (i32.add (local.get $ptr) (local.get $size)))
    (block $fits
      (loop $grow
        (br_if $fits
          (i32.le_u (local.get $end) (i32.mul (memory.size) (i32.const 65536))))
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1))
          (then unreachable))
        (br $grow)))
    (global.set $heap (local.get $end))
    (i32.store (i32.const 0) (i32.add (i32.load (i32.const 0)) (i32.const 1)))
    (local.get $ptr))

  (func $dealloc (export "dealloc") (param $ptr i32) (param $size i32)
    (i32.store (i32.const 0) (i32.sub (i32.load (i32.const 0)) (i32.const 1))))

  (func $fail (param $msg i32) (param $len i32)
    (local $ptr i32)
    (local.set $ptr (call $alloc (local.get $len)))
    (memory.copy (local.get $ptr) (local.get $msg) (local.get $len))
    (call $panic (local.get $ptr) (local.get $len))
    unreachable)

  (func (export "hash")
    (param $pw i32) (param $pw_len i32)
    (param $salt i32) (param $salt_len i32)
    (param $out i32) (param $out_cap i32) (param $out_len i32)
    (param $version i32) (param $cost i32)
    (local $len i32)
    (if (i32.eq (local.get $cost) (i32.const 99))
      (then unreachable))
    (if (i32.gt_u (local.get $cost) (i32.const 31))
      (then (call $fail (i32.const 16) (i32.const 17))))
    (local.set $len
      (i32.add (i32.const 1) (i32.add (local.get $salt_len) (local.get $pw_len))))
    (if (i32.gt_u (local.get $len) (local.get $out_cap))
      (then (call $fail (i32.const 96) (i32.const 23))))
    (i32.store8 (local.get $out) (local.get $version))
    (memory.copy
      (i32.add (local.get $out) (i32.const 1))
      (local.get $salt)
      (local.get $salt_len))
    (memory.copy
      (i32.add (local.get $out) (i32.add (i32.const 1) (local.get $salt_len)))
      (local.get $pw)
      (local.get $pw_len))
    (i32.store (local.get $out_len) (local.get $len)))

  (func (export "verify")
    (param $pw i32) (param $pw_len i32)
    (param $hash i32) (param $hash_len i32)
    (param $matches i32)
    (local $i i32)
    (local $ok i32)
    (if (i32.eqz (local.get $hash_len))
      (then (call $fail (i32.const 64) (i32.const 10))))
    (local.set $ok
      (i32.eq (local.get $hash_len) (i32.add (local.get $pw_len) (i32.const 17))))
    (if (local.get $ok)
      (then
        (block $end
          (loop $cmp
            (br_if $end (i32.ge_u (local.get $i) (local.get $pw_len)))
            (if (i32.ne
                  (i32.load8_u (i32.add (local.get $pw) (local.get $i)))
                  (i32.load8_u
                    (i32.add (local.get $hash) (i32.add (i32.const 17) (local.get $i)))))
              (then
                (local.set $ok (i32.const 0))
                (br $end)))
            (local.set $i (i32.add (local.get $i) (i32.const 1)))
            (br $cmp)))))
    (i32.store8 (local.get $matches) (local.get $ok)))
)
"#;

/// The mock guest compiled to wasm.
pub fn mock_guest_wasm() -> Vec<u8> {
    wat::parse_str(MOCK_GUEST_WAT).expect("mock guest WAT is valid")
}

/// The mock guest as an artifact.
pub fn mock_artifact() -> Artifact {
    Artifact::from_wasm(mock_guest_wasm()).expect("mock guest has a wasm header")
}

/// A module that links but lacks the `verify` export.
pub fn incomplete_guest_wasm() -> Vec<u8> {
    wat::parse_str(
        r#"
        (module
          (import "env" "panic" (func (param i32 i32)))
          (memory (export "memory") 1)
          (func (export "alloc") (param i32) (result i32) (i32.const 8))
          (func (export "dealloc") (param i32 i32))
          (func (export "hash") (param i32 i32 i32 i32 i32 i32 i32 i32 i32)))
        "#,
    )
    .expect("incomplete guest WAT is valid")
}

/// Live allocation count kept by the mock guest at address 0.
pub fn live_allocations(runtime: &Runtime) -> i32 {
    let bytes = runtime.peek(0, 4).expect("address 0 is always mapped");
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
