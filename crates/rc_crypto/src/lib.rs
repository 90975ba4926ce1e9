//! rc_crypto: Relaychat cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Pure functions, no state: callers own every key they pass in.
//!
//! # Module layout
//! - `identity`: long-term Ed25519 signing identity + handshake signature checks
//! - `exchange`: X25519 encryption keys and the shared-secret computation
//! - `aead`: AES-256-GCM encrypt/decrypt helpers
//! - `kdf`: HKDF session keys, Argon2id password hashing and vault keys
//! - `error`: unified error type

pub mod aead;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod kdf;

pub use error::CryptoError;
pub use exchange::{compute_shared_secret, EncryptionKeyPair, SharedSecret};
pub use identity::{verify_ed_signatures, IdentityKeyPair, PublicKeyBytes};
pub use kdf::{derive_keys, SessionKeys};

/// Length of the random handshake nonce carried by key-exchange messages.
pub const HANDSHAKE_NONCE_LEN: usize = 32;

/// Fresh 32-byte handshake nonce from the OS RNG.
pub fn random_nonce() -> [u8; HANDSHAKE_NONCE_LEN] {
    use rand::RngCore;
    let mut nonce = [0u8; HANDSHAKE_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}
