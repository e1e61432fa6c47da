//! Async wrapper over a shared handle.
//!
//! bcrypt is CPU-bound, so every guest call runs on tokio's blocking pool
//! rather than on an executor thread.

use tokio::task;

use crate::error::{BcryptError, Result};
use crate::params::{BcryptParams, Salt};
use crate::shared::SharedBcrypt;
use crate::BcryptBuilder;

/// A [`SharedBcrypt`] driven from async code.
#[derive(Debug, Clone)]
pub struct AsyncBcrypt {
    shared: SharedBcrypt,
}

impl AsyncBcrypt {
    /// Load a guest on the blocking pool.
    pub async fn load(builder: BcryptBuilder) -> Result<Self> {
        let shared = run(move || builder.build_shared()).await?;
        Ok(Self { shared })
    }

    /// Hash `password`. A supplied salt is checked before any task is spawned.
    pub async fn hash(
        &self,
        password: impl AsRef<[u8]>,
        salt: Option<&[u8]>,
        params: Option<BcryptParams>,
    ) -> Result<String> {
        let salt = salt.map(Salt::try_from).transpose()?;
        let password = password.as_ref().to_vec();
        let shared = self.shared.clone();

        run(move || {
            let mut bcrypt = shared.lock();
            let params = params.unwrap_or(bcrypt.defaults());
            let salt = salt.unwrap_or_else(Salt::random);
            bcrypt.hash_with_salt(&password, &salt, params)
        })
        .await
    }

    /// Check `password` against an encoded hash.
    pub async fn verify(&self, password: impl AsRef<[u8]>, hash: &str) -> Result<bool> {
        let password = password.as_ref().to_vec();
        let hash = hash.to_string();
        let shared = self.shared.clone();

        run(move || shared.verify(&password, &hash)).await
    }

    /// The underlying shared handle.
    pub fn shared(&self) -> &SharedBcrypt {
        &self.shared
    }
}

impl From<SharedBcrypt> for AsyncBcrypt {
    fn from(shared: SharedBcrypt) -> Self {
        Self { shared }
    }
}

async fn run<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(BcryptError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcrypt_wasm_runtime::EngineKind;
    use bcrypt_wasm_runtime::test_utils::{MOCK_COST_MESSAGE, mock_artifact};

    fn mock_builder() -> BcryptBuilder {
        BcryptBuilder::new()
            .with_engine(EngineKind::Polyfill)
            .with_artifact(mock_artifact())
    }

    #[tokio::test]
    async fn test_async_hash_and_verify() {
        let bcrypt = AsyncBcrypt::load(mock_builder()).await.unwrap();

        let hash = bcrypt.hash("password", Some(b"saltsaltsaltsalt"), None).await.unwrap();
        assert_eq!(hash, "bsaltsaltsaltsaltpassword");
        assert!(bcrypt.verify("password", &hash).await.unwrap());
        assert!(!bcrypt.verify("other", &hash).await.unwrap());
        assert!(bcrypt.shared().stats().is_balanced());
    }

    #[tokio::test]
    async fn test_async_errors() {
        let bcrypt = AsyncBcrypt::load(mock_builder()).await.unwrap();

        let err = bcrypt.hash("password", Some(b"short"), None).await.unwrap_err();
        assert!(matches!(err, BcryptError::InvalidSaltLength { actual: 5, .. }));

        let err = bcrypt
            .hash("password", None, Some(BcryptParams::new().with_cost(40)))
            .await
            .unwrap_err();
        assert_eq!(err.guest_panic().unwrap().message(), MOCK_COST_MESSAGE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_concurrent_calls() {
        let bcrypt = AsyncBcrypt::load(mock_builder()).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let bcrypt = bcrypt.clone();
                tokio::spawn(async move {
                    let password = format!("password-{i}");
                    let hash = bcrypt
                        .hash(&password, Some(b"saltsaltsaltsalt"), None)
                        .await
                        .unwrap();
                    bcrypt.verify(&password, &hash).await.unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert!(bcrypt.shared().stats().is_balanced());
    }

    #[tokio::test]
    #[cfg_attr(bundled_guest_missing, ignore)]
    async fn test_async_random_salt_with_real_guest() {
        let bcrypt = AsyncBcrypt::load(BcryptBuilder::new().with_default_cost(4))
            .await
            .unwrap();

        let first = bcrypt.hash("password", None, None).await.unwrap();
        let second = bcrypt.hash("password", None, None).await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$2b$04$"));
        assert!(bcrypt.verify("password", &first).await.unwrap());
        assert!(!bcrypt.verify("other", &second).await.unwrap());
        assert!(bcrypt.shared().stats().is_balanced());
    }
}
