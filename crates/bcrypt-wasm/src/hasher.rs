//! The `Bcrypt` handle: hash and verify through a loaded guest.

use tracing::debug;

use bcrypt_wasm_runtime::{BridgeStats, EngineKind, HashArgs, Runtime, VerifyArgs};

use crate::error::{BcryptError, Result};
use crate::params::{
    BcryptParams, MATCHES_BYTES, OUTPUT_BYTES, OUTPUT_LEN_BYTES, Salt,
};

/// A loaded bcrypt guest.
///
/// `hash` and `verify` take `&mut self`: the guest is single-threaded and a
/// handle runs one call at a time. See [`SharedBcrypt`](crate::SharedBcrypt)
/// and [`BcryptPool`](crate::BcryptPool) for sharing.
pub struct Bcrypt {
    runtime: Runtime,
    defaults: BcryptParams,
}

impl Bcrypt {
    pub(crate) fn from_runtime(runtime: Runtime, defaults: BcryptParams) -> Self {
        Self { runtime, defaults }
    }

    /// Hash `password`.
    ///
    /// A missing `salt` is drawn from the OS CSPRNG; a supplied one must be
    /// exactly 16 bytes and is checked before the guest is touched. Missing
    /// `params` fall back to this handle's defaults.
    pub fn hash(
        &mut self,
        password: impl AsRef<[u8]>,
        salt: Option<&[u8]>,
        params: Option<BcryptParams>,
    ) -> Result<String> {
        let params = params.unwrap_or(self.defaults);
        let salt = match salt {
            Some(bytes) => Salt::try_from(bytes)?,
            None => Salt::random(),
        };
        self.hash_with_salt(password, &salt, params)
    }

    /// Hash `password` with an already validated salt.
    pub fn hash_with_salt(
        &mut self,
        password: impl AsRef<[u8]>,
        salt: &Salt,
        params: BcryptParams,
    ) -> Result<String> {
        debug!(
            instance_id = %self.runtime.id(),
            version = %params.version,
            cost = params.cost,
            "Hashing password"
        );

        let mut scope = self.runtime.scope();
        let password = scope.transfer(password.as_ref())?;
        let salt = scope.transfer(salt.as_bytes())?;
        let output = scope.allocate(OUTPUT_BYTES)?;
        let output_len = scope.allocate(OUTPUT_LEN_BYTES)?;

        scope.hash(HashArgs {
            password_ptr: password.ptr,
            password_len: password.len,
            salt_ptr: salt.ptr,
            salt_len: salt.len,
            output_ptr: output.ptr,
            output_cap: output.len,
            output_len_ptr: output_len.ptr,
            version_tag: params.version.tag(),
            cost: params.cost,
        })?;
        scope.release(password)?;
        scope.release(salt)?;

        let len = scope.read(output_len, 4)?;
        let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if len > OUTPUT_BYTES {
            return Err(BcryptError::OutputOverflow {
                len,
                capacity: OUTPUT_BYTES,
            });
        }

        let encoded = scope.read(output, len)?;
        scope.finish()?;

        Ok(String::from_utf8(encoded)?)
    }

    /// Check `password` against an encoded hash.
    ///
    /// A hash the guest cannot parse is an error, not a mismatch.
    pub fn verify(&mut self, password: impl AsRef<[u8]>, hash: &str) -> Result<bool> {
        debug!(instance_id = %self.runtime.id(), "Verifying password");

        let mut scope = self.runtime.scope();
        let password = scope.transfer(password.as_ref())?;
        let encoded = scope.transfer(hash.as_bytes())?;
        let matches = scope.allocate(MATCHES_BYTES)?;

        scope.verify(VerifyArgs {
            password_ptr: password.ptr,
            password_len: password.len,
            hash_ptr: encoded.ptr,
            hash_len: encoded.len,
            matches_ptr: matches.ptr,
        })?;
        scope.release(password)?;
        scope.release(encoded)?;

        let flag = scope.read(matches, 1)?;
        scope.finish()?;

        Ok(flag[0] != 0)
    }

    /// Parameters used when `hash` is given none.
    pub fn defaults(&self) -> BcryptParams {
        self.defaults
    }

    /// Change the parameters used when `hash` is given none.
    pub fn set_defaults(&mut self, defaults: BcryptParams) {
        self.defaults = defaults;
    }

    /// Which engine runs the guest.
    pub fn engine(&self) -> EngineKind {
        self.runtime.kind()
    }

    /// Guest allocation counters.
    pub fn stats(&self) -> BridgeStats {
        self.runtime.stats()
    }

    /// The underlying runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

impl std::fmt::Debug for Bcrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bcrypt")
            .field("runtime", &self.runtime)
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BcryptBuilder;
    use crate::params::{BcryptVersion, SALT_BYTES};
    use bcrypt_wasm_runtime::test_utils::{
        MOCK_COST_MESSAGE, MOCK_EMPTY_HASH_MESSAGE, MOCK_TRAP_COST, live_allocations,
        mock_artifact,
    };

    const SALT: &[u8] = b"saltsaltsaltsalt";

    fn mock(kind: EngineKind) -> Bcrypt {
        BcryptBuilder::new()
            .with_engine(kind)
            .with_artifact(mock_artifact())
            .build()
            .unwrap()
    }

    #[test]
    fn test_hash_marshalling() {
        for kind in EngineKind::ALL {
            let mut bcrypt = mock(kind);
            let params = BcryptParams::new().with_version(BcryptVersion::TwoY).with_cost(4);

            let hash = bcrypt.hash("password", Some(SALT), Some(params)).unwrap();
            assert_eq!(hash, "ysaltsaltsaltsaltpassword");

            let stats = bcrypt.stats();
            assert!(stats.is_balanced());
            assert_eq!(stats.allocations, 4);
            assert_eq!(
                stats.peak_live_bytes as usize,
                8 + SALT_BYTES + OUTPUT_BYTES + OUTPUT_LEN_BYTES
            );
            assert_eq!(live_allocations(bcrypt.runtime()), 0);
        }
    }

    #[test]
    fn test_defaults_apply() {
        let mut bcrypt = mock(EngineKind::Polyfill);
        assert_eq!(bcrypt.defaults(), BcryptParams::default());

        let hash = bcrypt.hash("pw", Some(SALT), None).unwrap();
        assert!(hash.starts_with('b'));

        bcrypt.set_defaults(BcryptParams::new().with_version(BcryptVersion::TwoA));
        let hash = bcrypt.hash("pw", Some(SALT), None).unwrap();
        assert!(hash.starts_with('a'));
    }

    #[test]
    fn test_empty_password() {
        let mut bcrypt = mock(EngineKind::Production);
        let hash = bcrypt.hash("", Some(SALT), None).unwrap();
        assert_eq!(hash, "bsaltsaltsaltsalt");
        assert!(bcrypt.verify("", &hash).unwrap());
        assert!(bcrypt.stats().is_balanced());
    }

    #[test]
    fn test_invalid_salt_touches_nothing() {
        for kind in EngineKind::ALL {
            let mut bcrypt = mock(kind);
            let memory_before = bcrypt.runtime().memory_size();

            for salt in [&b""[..], &b"short"[..], &b"saltsaltsaltsaltX"[..]] {
                let err = bcrypt.hash("password", Some(salt), None).unwrap_err();
                assert!(matches!(
                    err,
                    BcryptError::InvalidSaltLength { expected: 16, actual } if actual == salt.len()
                ));
            }

            assert_eq!(bcrypt.stats(), BridgeStats::default());
            assert_eq!(bcrypt.runtime().memory_size(), memory_before);
            assert_eq!(live_allocations(bcrypt.runtime()), 0);
        }
    }

    #[test]
    fn test_verify_marshalling() {
        for kind in EngineKind::ALL {
            let mut bcrypt = mock(kind);
            let hash = bcrypt.hash("password", Some(SALT), None).unwrap();

            assert!(bcrypt.verify("password", &hash).unwrap());
            assert!(!bcrypt.verify("not-the-same-password", &hash).unwrap());
            assert!(bcrypt.stats().is_balanced());
            assert_eq!(live_allocations(bcrypt.runtime()), 0);
        }
    }

    #[test]
    fn test_panics_leak_nothing() {
        for kind in EngineKind::ALL {
            let mut bcrypt = mock(kind);

            for _ in 0..5 {
                let err = bcrypt
                    .hash("password", Some(SALT), Some(BcryptParams::new().with_cost(32)))
                    .unwrap_err();
                assert_eq!(err.guest_panic().unwrap().message(), MOCK_COST_MESSAGE);

                let err = bcrypt.verify("password", "").unwrap_err();
                assert_eq!(err.guest_panic().unwrap().message(), MOCK_EMPTY_HASH_MESSAGE);

                let err = bcrypt
                    .hash("password", Some(SALT), Some(BcryptParams::new().with_cost(MOCK_TRAP_COST)))
                    .unwrap_err();
                assert!(err.is_trap());
            }

            assert!(bcrypt.stats().is_balanced());
            assert_eq!(bcrypt.stats().allocations, 5 * (4 + 3 + 4));
            assert_eq!(live_allocations(bcrypt.runtime()), 0);

            // Still usable afterwards.
            let hash = bcrypt.hash("password", Some(SALT), None).unwrap();
            assert!(bcrypt.verify("password", &hash).unwrap());
        }
    }

    #[test]
    fn test_oversized_output_is_refused() {
        let mut bcrypt = mock(EngineKind::Polyfill);
        let long = "p".repeat(OUTPUT_BYTES);

        // The mock refuses to write past the output capacity.
        let err = bcrypt.hash(&long, Some(SALT), None).unwrap_err();
        assert!(err.guest_panic().is_some());
        assert!(bcrypt.stats().is_balanced());
    }
}
