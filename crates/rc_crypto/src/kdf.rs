//! Key derivation functions
//!
//! `derive_keys`: HKDF-SHA256 over an X25519 shared secret, producing the
//!   per-chat encryption key and authentication key.
//!
//! `vault_key_from_password`: Argon2id, derives the 32-byte key that seals
//!   chat secrets in the local SQLite store.
//!
//! `hash_password` / `verify_password`: Argon2id PHC strings for login.

use argon2::{
    password_hash::{rand_core::OsRng as PhcOsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CryptoError, exchange::SharedSecret};

// ── Session keys (HKDF-SHA256) ────────────────────────────────────────────────

/// Encryption + authentication keys derived from one chat's shared secret.
/// Process-local only; zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    enc_key: [u8; 32],
    hmac_key: [u8; 32],
}

impl SessionKeys {
    pub fn enc_key(&self) -> &[u8; 32] {
        &self.enc_key
    }

    pub fn hmac_key(&self) -> &[u8; 32] {
        &self.hmac_key
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Expand the shared secret into (enc_key, hmac_key).
///
/// HKDF with no salt and an empty info string; both keys are read from the
/// same 64-byte expansion, encryption key first. Equal secrets always give
/// byte-identical keys, which is what lets both handshake parties converge.
pub fn derive_keys(shared: &SharedSecret) -> Result<SessionKeys, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; 64];
    hk.expand(&[], &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut keys = SessionKeys { enc_key: [0u8; 32], hmac_key: [0u8; 32] };
    keys.enc_key.copy_from_slice(&okm[..32]);
    keys.hmac_key.copy_from_slice(&okm[32..]);
    okm.zeroize();
    Ok(keys)
}

// ── Vault key (Argon2id) ──────────────────────────────────────────────────────

/// 32-byte vault key derived from user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

/// Argon2id parameters tuned for interactive (desktop) use.
fn argon2_params() -> Result<Params, CryptoError> {
    Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 iterations
        1,         // p_cost: 1 thread
        Some(32),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive a vault key from a user password + 16-byte salt.
/// The salt is stored next to the database (not secret).
pub fn vault_key_from_password(password: &[u8], salt: &[u8; 16]) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params()?);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Generate a fresh random 16-byte salt.
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── Login password hashing ────────────────────────────────────────────────────

/// Hash a login password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut PhcOsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))
}

/// Check a login password against a stored PHC string.
/// A malformed stored hash is an error; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, phc: &str) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(phc).map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{compute_shared_secret, EncryptionKeyPair};

    fn some_secret() -> SharedSecret {
        let a = EncryptionKeyPair::generate();
        let b = EncryptionKeyPair::generate();
        compute_shared_secret(&a, b.public_bytes()).unwrap()
    }

    #[test]
    fn derive_keys_is_deterministic() {
        let secret = some_secret();
        let first = derive_keys(&secret).unwrap();
        let second = derive_keys(&secret).unwrap();
        assert_eq!(first.enc_key(), second.enc_key());
        assert_eq!(first.hmac_key(), second.hmac_key());
    }

    #[test]
    fn enc_and_hmac_keys_differ() {
        let keys = derive_keys(&some_secret()).unwrap();
        assert_ne!(keys.enc_key(), keys.hmac_key());
    }

    #[test]
    fn matches_raw_hkdf_stream() {
        let secret = SharedSecret::from_bytes([5u8; 32]);
        let keys = derive_keys(&secret).unwrap();

        let hk = Hkdf::<Sha256>::new(None, &[5u8; 32]);
        let mut okm = [0u8; 64];
        hk.expand(&[], &mut okm).unwrap();
        assert_eq!(keys.enc_key(), &okm[..32]);
        assert_eq!(keys.hmac_key(), &okm[32..]);
    }

    #[test]
    fn password_hash_verifies() {
        let phc = hash_password("correct horse battery staple").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery staple", &phc).unwrap());
        assert!(!verify_password("wrong", &phc).unwrap());
    }

    #[test]
    fn malformed_phc_is_an_error() {
        assert!(verify_password("pw", "not-a-phc-string").is_err());
    }

    #[test]
    fn vault_key_depends_on_salt() {
        let a = vault_key_from_password(b"pw", &[1u8; 16]).unwrap();
        let b = vault_key_from_password(b"pw", &[2u8; 16]).unwrap();
        assert_ne!(a.0, b.0);
    }
}
