use rc_proto::ChatState;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] rc_crypto::CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] rc_store::StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] rc_proto::CodecError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown chat: {0}")]
    UnknownChat(Uuid),

    #[error("Unknown peer: {0} is not in the address book")]
    UnknownPeer(Uuid),

    #[error("Unknown invite: {0}")]
    UnknownInvite(Uuid),

    #[error("Invalid state transition for chat {chat_id}: {from} -> {to}")]
    InvalidTransition {
        chat_id: Uuid,
        from: ChatState,
        to: ChatState,
    },

    #[error("Chat {0} has no session keys")]
    MissingKeys(Uuid),

    #[error("Chat {0} is not encrypted yet")]
    NotEncrypted(Uuid),

    #[error("Key exchange failed for chat {chat_id}: {reason}")]
    ExchangeFailed { chat_id: Uuid, reason: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for failures that end one handshake attempt. The caller decides
    /// whether to retry with a fresh `initiate_key_exchange`.
    pub fn is_exchange_failure(&self) -> bool {
        matches!(
            self,
            Self::Crypto(_) | Self::ExchangeFailed { .. } | Self::UnknownPeer(_)
        )
    }
}

/// Result of handling one inbound payload that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled,
    /// Dropped without side effects; the reason is logged.
    Ignored(&'static str),
}
