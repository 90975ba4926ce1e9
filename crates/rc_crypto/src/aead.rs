//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM (96-bit nonce).
//! Key size: 32 bytes.  Nonce: 12 bytes (random, fresh per call).  Tag: 16 bytes.
//!
//! Ciphertext wire format:
//!   [ nonce (12 bytes) | ciphertext + tag ]
//!
//! No associated data is bound; the chat binding travels in the envelope.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Nonce length required by AES-256-GCM.
pub const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with a 32-byte key, prepending a random 12-byte nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;

    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
pub fn decrypt(key: &[u8; 32], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;

    let plaintext = cipher
        .decrypt(nonce, ct)
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [7u8; 32];
        let sealed = encrypt(&key, b"hello relay").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + b"hello relay".len() + 16);
        let opened = decrypt(&key, &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"hello relay");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = [1u8; 32];
        let sealed = encrypt(&key, b"").unwrap();
        assert!(decrypt(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = [3u8; 32];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_byte_is_rejected() {
        let key = [9u8; 32];
        let sealed = encrypt(&key, b"do not touch").unwrap();
        for i in 0..sealed.len() {
            let mut bad = sealed.clone();
            bad[i] ^= 0x01;
            assert!(
                matches!(decrypt(&key, &bad), Err(CryptoError::AeadDecrypt)),
                "flip at byte {i} must fail authentication"
            );
        }
    }

    #[test]
    fn short_input_is_rejected() {
        let key = [9u8; 32];
        assert!(matches!(decrypt(&key, &[0u8; NONCE_LEN - 1]), Err(CryptoError::AeadDecrypt)));
        assert!(matches!(decrypt(&key, &[]), Err(CryptoError::AeadDecrypt)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let sealed = encrypt(&[1u8; 32], b"secret").unwrap();
        assert!(decrypt(&[2u8; 32], &sealed).is_err());
    }
}
