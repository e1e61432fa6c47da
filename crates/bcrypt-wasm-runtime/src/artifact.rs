//! Guest bytecode artifacts.
//!
//! The build pipeline ships the guest as an lz4 block with its decompressed
//! size prepended. [`Artifact`] accepts that form as well as raw wasm, and
//! refuses anything that does not start with the wasm magic header.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{LoadError, LoadResult};

/// The `\0asm` magic number every wasm binary starts with.
pub const WASM_MAGIC: [u8; 4] = *b"\0asm";

/// Validated guest bytecode, ready to instantiate.
///
/// Cheap to clone; the bytes are shared.
#[derive(Clone)]
pub struct Artifact {
    wasm: Arc<[u8]>,
}

impl Artifact {
    /// Wrap raw wasm bytecode.
    pub fn from_wasm(bytes: impl Into<Vec<u8>>) -> LoadResult<Self> {
        let bytes = bytes.into();
        if !bytes.starts_with(&WASM_MAGIC) {
            return Err(LoadError::InvalidArtifact(
                "missing wasm magic header".to_string(),
            ));
        }
        Ok(Self { wasm: bytes.into() })
    }

    /// Decompress an lz4 block with prepended size, as produced by the build
    /// pipeline.
    pub fn from_compressed(bytes: &[u8]) -> LoadResult<Self> {
        if bytes.is_empty() {
            return Err(LoadError::ArtifactUnavailable);
        }

        let wasm = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| LoadError::InvalidArtifact(format!("lz4: {}", e)))?;

        debug!(
            compressed = bytes.len(),
            decompressed = wasm.len(),
            "Decompressed guest artifact"
        );

        Self::from_wasm(wasm)
    }

    /// Read an artifact from disk. A `.lz4` extension means compressed.
    pub fn from_file(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        if path.extension().is_some_and(|ext| ext == "lz4") {
            Self::from_compressed(&bytes)
        } else {
            Self::from_wasm(bytes)
        }
    }

    /// The wasm bytecode.
    pub fn wasm(&self) -> &[u8] {
        &self.wasm
    }

    /// Size of the wasm bytecode in bytes.
    pub fn len(&self) -> usize {
        self.wasm.len()
    }

    /// Whether the bytecode is empty.
    pub fn is_empty(&self) -> bool {
        self.wasm.is_empty()
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("len", &self.wasm.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_MODULE: &[u8] = b"\0asm\x01\0\0\0";

    #[test]
    fn test_from_wasm_checks_magic() {
        assert_eq!(Artifact::from_wasm(EMPTY_MODULE).unwrap().len(), 8);
        assert!(matches!(
            Artifact::from_wasm(b"not wasm".to_vec()),
            Err(LoadError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_compressed_round_trip() {
        let compressed = lz4_flex::compress_prepend_size(EMPTY_MODULE);
        let artifact = Artifact::from_compressed(&compressed).unwrap();
        assert_eq!(artifact.wasm(), EMPTY_MODULE);
    }

    #[test]
    fn test_corrupt_compressed() {
        assert!(matches!(
            Artifact::from_compressed(&[16, 0, 0, 0, 0xff]),
            Err(LoadError::InvalidArtifact(_))
        ));
        assert!(matches!(
            Artifact::from_compressed(&[]),
            Err(LoadError::ArtifactUnavailable)
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("bcrypt-wasm-artifact-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let raw = dir.join("guest.wasm");
        std::fs::write(&raw, EMPTY_MODULE).unwrap();
        assert_eq!(Artifact::from_file(&raw).unwrap().wasm(), EMPTY_MODULE);

        let packed = dir.join("guest.wasm.lz4");
        std::fs::write(&packed, lz4_flex::compress_prepend_size(EMPTY_MODULE)).unwrap();
        assert_eq!(Artifact::from_file(&packed).unwrap().wasm(), EMPTY_MODULE);

        assert!(matches!(
            Artifact::from_file(dir.join("missing.wasm")),
            Err(LoadError::Io(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
