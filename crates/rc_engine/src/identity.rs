use rc_crypto::{EncryptionKeyPair, IdentityKeyPair};
use rc_proto::IdentityBundle;
use uuid::Uuid;

/// The local user's long-term keys, loaded before the engine starts.
pub struct LocalIdentity {
    pub user_id: Uuid,
    pub username: String,
    /// Ed25519, authenticates handshake material.
    pub signing: IdentityKeyPair,
    /// X25519, the local half of every chat's shared secret.
    pub encryption: EncryptionKeyPair,
}

impl LocalIdentity {
    pub fn new(
        user_id: Uuid,
        username: impl Into<String>,
        signing: IdentityKeyPair,
        encryption: EncryptionKeyPair,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            signing,
            encryption,
        }
    }

    /// Fresh random identity, for tests and throwaway sessions.
    pub fn generate(username: impl Into<String>) -> Self {
        Self::new(
            Uuid::new_v4(),
            username,
            IdentityKeyPair::generate(),
            EncryptionKeyPair::generate(),
        )
    }

    /// Public half, as shared in friend requests.
    pub fn bundle(&self) -> IdentityBundle {
        IdentityBundle {
            user_id: self.user_id,
            username: self.username.clone(),
            curve_public_key: self.encryption.public_bytes().to_vec(),
            signing_public_key: self.signing.public.0.clone(),
        }
    }
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("fingerprint", &self.signing.public.fingerprint())
            .finish_non_exhaustive()
    }
}
