//! Encrypted message envelope: what the relay server sees.
//!
//! The server is a DUMB RELAY: it only sees:
//!   - message_id (random UUID, used for dedup on save)
//!   - sender_id  (needed for routing replies)
//!   - chat_id    (destination chat binding)
//!   - sent_at_ms (sender clock, milliseconds since the Unix epoch)
//!   - ciphertext (nonce || AES-256-GCM ciphertext+tag, opaque)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::b64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub chat_id: Uuid,
    pub sent_at_ms: i64,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}
