//! The guest artifact embedded at build time.

use bcrypt_wasm_runtime::{Artifact, LoadResult};

static BUNDLED_GUEST: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/bcrypt_guest.wasm.lz4"));

/// Whether this build carries a guest artifact.
pub fn is_bundled() -> bool {
    !BUNDLED_GUEST.is_empty()
}

/// Decompress the bundled guest.
///
/// Fails with `LoadError::ArtifactUnavailable` when the guest could not be
/// built alongside this crate.
pub fn bundled_artifact() -> LoadResult<Artifact> {
    Artifact::from_compressed(BUNDLED_GUEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(bundled_guest_missing, ignore)]
    fn test_bundled_guest_decompresses() {
        assert!(is_bundled());
        let artifact = bundled_artifact().unwrap();
        assert!(artifact.wasm().starts_with(b"\0asm"));
    }

    #[test]
    #[cfg(bundled_guest_missing)]
    fn test_missing_guest_is_reported() {
        use bcrypt_wasm_runtime::LoadError;

        assert!(!is_bundled());
        assert!(matches!(bundled_artifact(), Err(LoadError::ArtifactUnavailable)));
    }
}
