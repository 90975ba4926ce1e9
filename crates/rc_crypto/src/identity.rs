//! Identity key management
//!
//! Each user has one long-term `IdentityKeyPair` (Ed25519). It never
//! encrypts anything; it authenticates handshake material. A key-exchange
//! request or response carries two signatures made with it:
//!
//!   sigs[0] = sign(nonce)
//!   sigs[1] = sign(curve_public_key)
//!
//! The receiving side checks both against the signing key it already holds
//! in its address book (`verify_ed_signatures`).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Newtype wrappers ──────────────────────────────────────────────────────────

/// 32-byte Ed25519 public key, base64url-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(pub Vec<u8>);

impl PublicKeyBytes {
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "Public key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4 for display.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// Long-term identity signing key.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes().to_vec());
        Self { public, secret_bytes: signing_key.to_bytes() }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Identity key must be 32 bytes, got {}", bytes.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&arr);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes().to_vec());
        Ok(Self { public, secret_bytes: arr })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    /// Sign arbitrary bytes; returns 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing_key().sign(msg).to_bytes().to_vec()
    }

    /// The signature pair that authenticates one side of a key exchange.
    pub fn sign_handshake(&self, nonce: &[u8], curve_public_key: &[u8]) -> Vec<Vec<u8>> {
        let key = self.signing_key();
        vec![
            key.sign(nonce).to_bytes().to_vec(),
            key.sign(curve_public_key).to_bytes().to_vec(),
        ]
    }

    /// Verify a signature made by any Ed25519 public key.
    pub fn verify(public_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_bytes(
            public_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad pubkey len".into()))?,
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_bytes(
            sig_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?,
        );
        vk.verify(msg, &sig).map_err(|_| CryptoError::SignatureVerification)
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

/// Check the handshake signature pair.
///
/// Returns true only if there are exactly two signatures, `sigs[0]` verifies
/// over `nonce` and `sigs[1]` over `curve_public_key`, both under
/// `signer_public_key`. Any other count, a malformed key or signature, or a
/// mismatch gives false.
pub fn verify_ed_signatures(
    signer_public_key: &[u8],
    nonce: &[u8],
    curve_public_key: &[u8],
    sigs: &[Vec<u8>],
) -> bool {
    if sigs.len() != 2 {
        return false;
    }
    IdentityKeyPair::verify(signer_public_key, nonce, &sigs[0]).is_ok()
        && IdentityKeyPair::verify(signer_public_key, curve_public_key, &sigs[1]).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_material() -> (IdentityKeyPair, [u8; 32], [u8; 32], Vec<Vec<u8>>) {
        let identity = IdentityKeyPair::generate();
        let nonce = crate::random_nonce();
        let curve = [42u8; 32];
        let sigs = identity.sign_handshake(&nonce, &curve);
        (identity, nonce, curve, sigs)
    }

    #[test]
    fn valid_pair_verifies() {
        let (identity, nonce, curve, sigs) = signed_material();
        assert!(verify_ed_signatures(&identity.public.0, &nonce, &curve, &sigs));
    }

    #[test]
    fn fewer_than_two_signatures_fail() {
        let (identity, nonce, curve, sigs) = signed_material();
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &[]));
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &sigs[..1]));
    }

    #[test]
    fn extra_signatures_fail() {
        let (identity, nonce, curve, mut sigs) = signed_material();
        sigs.push(sigs[0].clone());
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &sigs));
        sigs.push(vec![0u8; 64]);
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &sigs));
    }

    #[test]
    fn swapped_signatures_fail() {
        let (identity, nonce, curve, sigs) = signed_material();
        let swapped = vec![sigs[1].clone(), sigs[0].clone()];
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &swapped));
    }

    #[test]
    fn wrong_signer_fails() {
        let (_identity, nonce, curve, sigs) = signed_material();
        let other = IdentityKeyPair::generate();
        assert!(!verify_ed_signatures(&other.public.0, &nonce, &curve, &sigs));
    }

    #[test]
    fn tampered_nonce_or_key_fails() {
        let (identity, mut nonce, mut curve, sigs) = signed_material();
        nonce[0] ^= 0xff;
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &sigs));
        nonce[0] ^= 0xff;
        curve[31] ^= 0x01;
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &sigs));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        let (identity, nonce, curve, _) = signed_material();
        let short = vec![vec![0u8; 10], vec![0u8; 10]];
        assert!(!verify_ed_signatures(&identity.public.0, &nonce, &curve, &short));
        assert!(!verify_ed_signatures(&[1u8; 5], &nonce, &curve, &short));
    }

    #[test]
    fn b64_roundtrip_and_fingerprint() {
        let identity = IdentityKeyPair::generate();
        let decoded = PublicKeyBytes::from_b64(&identity.public_b64()).unwrap();
        assert_eq!(decoded, identity.public);
        assert_eq!(identity.public.fingerprint().split(' ').count(), 10);
        assert!(PublicKeyBytes::from_b64("AAAA").is_err());
    }

    #[test]
    fn from_bytes_restores_signer() {
        let identity = IdentityKeyPair::generate();
        let restored = IdentityKeyPair::from_bytes(identity.secret_bytes()).unwrap();
        let sig = restored.sign(b"msg");
        assert!(IdentityKeyPair::verify(&identity.public.0, b"msg", &sig).is_ok());
    }
}
