//! Records exchanged with the store.

use rc_proto::{ChatState, Direction};
use uuid::Uuid;

/// Persisted chat row. Key material is stored separately and sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub id: Uuid,
    pub name: String,
    /// Ordered participant user ids.
    pub participants: Vec<Uuid>,
    pub state: ChatState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub direction: Direction,
    pub plaintext: String,
    pub sent_at_ms: i64,
}

/// Address-book entry: one peer's public identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetails {
    pub user_id: Uuid,
    pub username: String,
    /// X25519 public key
    pub enc_public_key: Vec<u8>,
    /// Ed25519 public key
    pub sign_public_key: Vec<u8>,
}

impl From<&rc_proto::IdentityBundle> for UserDetails {
    fn from(bundle: &rc_proto::IdentityBundle) -> Self {
        Self {
            user_id: bundle.user_id,
            username: bundle.username.clone(),
            enc_public_key: bundle.curve_public_key.clone(),
            sign_public_key: bundle.signing_public_key.clone(),
        }
    }
}
