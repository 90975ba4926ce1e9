//! X25519 key agreement.
//!
//! Each user holds one long-term `EncryptionKeyPair`. Its public half is
//! published in the identity bundle and carried in every key-exchange
//! request/response; the two parties run one Diffie-Hellman each and arrive
//! at the same 32-byte shared secret, which feeds `kdf::derive_keys`.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Raw ECDH output. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("Shared secret must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Long-term X25519 encryption key. The secret half zeroizes itself on drop.
pub struct EncryptionKeyPair {
    secret: StaticSecret,
    public: X25519Public,
}

impl EncryptionKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Encryption key must be 32 bytes, got {}", bytes.len()))
        })?;
        let secret = StaticSecret::from(arr);
        let public = X25519Public::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_bytes(&self) -> &[u8; 32] {
        self.public.as_bytes()
    }
}

/// X25519 Diffie-Hellman between our private key and the peer's public key.
///
/// Rejects a remote key that is not exactly 32 bytes, and rejects low-order
/// points (the exchange would not depend on our secret).
pub fn compute_shared_secret(
    local: &EncryptionKeyPair,
    remote_public: &[u8],
) -> Result<SharedSecret, CryptoError> {
    let remote: [u8; 32] = remote_public.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("Curve public key must be 32 bytes, got {}", remote_public.len()))
    })?;
    let shared = local.secret.diffie_hellman(&X25519Public::from(remote));
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }
    Ok(SharedSecret(shared.to_bytes()))
}
