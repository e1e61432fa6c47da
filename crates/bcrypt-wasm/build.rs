//! Builds the bcrypt guest for wasm32, compresses it and leaves it in
//! `OUT_DIR` for `include_bytes!`.
//!
//! Set `BCRYPT_WASM_GUEST` to a prebuilt `.wasm` to skip the nested build.
//! If no guest can be produced the crate still builds: the bundled artifact
//! is empty, loading it reports `ArtifactUnavailable`, and tests that need it
//! are ignored through `cfg(bundled_guest_missing)`.

use std::path::{Path, PathBuf};
use std::process::Command;

const GUEST_ENV: &str = "BCRYPT_WASM_GUEST";
const GUEST_NAME: &str = "bcrypt_wasm_guest.wasm";

fn main() {
    let out_dir = PathBuf::from(std::env::var_os("OUT_DIR").unwrap());
    let manifest_dir = PathBuf::from(std::env::var_os("CARGO_MANIFEST_DIR").unwrap());
    let guest_dir = manifest_dir.join("../../guest");

    println!("cargo:rustc-check-cfg=cfg(bundled_guest_missing)");
    println!("cargo:rerun-if-env-changed={}", GUEST_ENV);
    println!("cargo:rerun-if-changed={}", guest_dir.join("src").display());
    println!("cargo:rerun-if-changed={}", guest_dir.join("Cargo.toml").display());

    let wasm = match std::env::var_os(GUEST_ENV) {
        Some(path) => std::fs::read(&path).map_err(|e| format!("{}: {}", Path::new(&path).display(), e)),
        None => build_guest(&guest_dir, &out_dir),
    };

    let packed = out_dir.join("bcrypt_guest.wasm.lz4");
    match wasm {
        Ok(wasm) => {
            std::fs::write(&packed, lz4_flex::compress_prepend_size(&wasm)).unwrap();
        }
        Err(reason) => {
            println!("cargo:warning=bcrypt guest not bundled: {}", reason);
            println!("cargo:rustc-cfg=bundled_guest_missing");
            std::fs::write(&packed, b"").unwrap();
        }
    }
}

fn build_guest(guest_dir: &Path, out_dir: &Path) -> Result<Vec<u8>, String> {
    let cargo_command = std::env::var_os("CARGO");
    let cargo_command = cargo_command.as_deref().unwrap_or_else(|| "cargo".as_ref());
    let target_dir = out_dir.join("guest-target");

    let status = Command::new(cargo_command)
        .current_dir(guest_dir)
        .arg("build")
        .arg("--manifest-path")
        .arg(guest_dir.join("Cargo.toml"))
        .arg("--release")
        .arg("--target")
        .arg("wasm32-unknown-unknown")
        .env("CARGO_TARGET_DIR", &target_dir)
        .env_remove("CARGO_ENCODED_RUSTFLAGS")
        .status()
        .map_err(|e| format!("failed to run cargo: {}", e))?;

    if !status.success() {
        return Err(format!(
            "guest build failed ({}); is the wasm32-unknown-unknown target installed?",
            status
        ));
    }

    let wasm_path = target_dir
        .join("wasm32-unknown-unknown")
        .join("release")
        .join(GUEST_NAME);
    std::fs::read(&wasm_path).map_err(|e| format!("{}: {}", wasm_path.display(), e))
}
