//! Vault: in-memory key material unlocked by user password.
//!
//! The vault holds the 32-byte key that seals chat secrets in SQLite.
//! Locking zeroizes the key.

use std::sync::Arc;

use rc_crypto::kdf::vault_key_from_password;
use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use crate::error::StoreError;

#[derive(ZeroizeOnDrop)]
struct VaultInner {
    key: [u8; 32],
}

/// Thread-safe vault handle.  Clone to share with the store.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultInner>>>,
}

impl Vault {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(None)) }
    }

    /// Unlock the vault with the given password and salt.
    pub async fn unlock(&self, password: &[u8], salt: &[u8; 16]) -> Result<(), StoreError> {
        let vault_key = vault_key_from_password(password, salt)?;
        self.unlock_with_key(vault_key.0).await
    }

    /// Unlock with an existing key (e.g. from an OS keyring).
    pub async fn unlock_with_key(&self, key: [u8; 32]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner { key });
        Ok(())
    }

    /// Lock the vault and zeroize the key.
    pub async fn lock(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Run `f` with the raw key. Errors if the vault is locked.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(inner) => f(&inner.key),
            None => Err(StoreError::VaultLocked),
        }
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locked_vault_refuses_key_access() {
        let vault = Vault::new();
        assert!(vault.is_locked().await);
        let res = vault.with_key(|_| Ok(())).await;
        assert!(matches!(res, Err(StoreError::VaultLocked)));
    }

    #[tokio::test]
    async fn unlock_then_lock() {
        let vault = Vault::new();
        vault.unlock_with_key([4u8; 32]).await.unwrap();
        let first = vault.with_key(|k| Ok(k[0])).await.unwrap();
        assert_eq!(first, 4);

        vault.lock().await;
        assert!(vault.is_locked().await);
    }

    #[tokio::test]
    async fn password_unlock_is_deterministic_per_salt() {
        let a = Vault::new();
        let b = Vault::new();
        a.unlock(b"hunter2hunter2", &[7u8; 16]).await.unwrap();
        b.unlock(b"hunter2hunter2", &[7u8; 16]).await.unwrap();
        let ka = a.with_key(|k| Ok(*k)).await.unwrap();
        let kb = b.with_key(|k| Ok(*k)).await.unwrap();
        assert_eq!(ka, kb);
    }
}
