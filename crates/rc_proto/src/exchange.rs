//! Key-exchange messages.
//!
//! Four messages complete one handshake:
//!
//!   initiator ── KeyExchangeRequest ──────▶ responder
//!   initiator ◀─ KeyExchangeResponse ────── responder
//!   initiator ── KeyExchangeConfirmation ─▶ responder
//!   initiator ◀─ KeyExchangeConfirmation ── responder
//!
//! Request and response share one shape: the sender's X25519 public key, a
//! fresh 32-byte nonce, and `[sign(nonce), sign(curve_public_key)]` under the
//! sender's long-term Ed25519 key.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{b64, b64_list};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeRequest {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub target_id: Uuid,
    #[serde(with = "b64")]
    pub curve_public_key: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64_list")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeResponse {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub target_id: Uuid,
    #[serde(with = "b64")]
    pub curve_public_key: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64_list")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeConfirmation {
    pub chat_id: Uuid,
    pub success: bool,
    pub confirmer_id: Uuid,
    pub target_id: Uuid,
}

/// Nonce shape check shared by request and response handling.
pub fn nonce_has_valid_len(nonce: &[u8]) -> bool {
    nonce.len() == rc_crypto::HANDSHAKE_NONCE_LEN
}
