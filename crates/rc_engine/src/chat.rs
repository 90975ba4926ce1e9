//! In-core chat entity and its state machine.

use rc_crypto::{derive_keys, SessionKeys, SharedSecret};
use rc_proto::ChatState;
use rc_store::ChatRecord;
use uuid::Uuid;

use crate::error::EngineError;

/// One conversation. State only moves forward and `Encrypted` implies the
/// session keys are installed.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub participants: Vec<Uuid>,
    state: ChatState,
    secret: Option<SharedSecret>,
    keys: Option<SessionKeys>,
}

impl Chat {
    pub fn new(id: Uuid, name: impl Into<String>, participants: Vec<Uuid>) -> Self {
        Self {
            id,
            name: name.into(),
            participants,
            state: ChatState::Created,
            secret: None,
            keys: None,
        }
    }

    /// Rebuild from a stored row plus its unsealed secret, if any.
    ///
    /// A row marked encrypted whose secret is unavailable comes back as
    /// `KeyExchangePending` so a new exchange can be started.
    pub fn restore(record: ChatRecord, secret: Option<SharedSecret>) -> Result<Self, EngineError> {
        let mut chat = Self::new(record.id, record.name, record.participants);
        if let Some(secret) = secret {
            chat.install_secret(secret)?;
        }
        chat.state = if record.state == ChatState::Encrypted && chat.keys.is_none() {
            ChatState::KeyExchangePending
        } else {
            record.state
        };
        Ok(chat)
    }

    pub fn to_record(&self) -> ChatRecord {
        ChatRecord {
            id: self.id,
            name: self.name.clone(),
            participants: self.participants.clone(),
            state: self.state,
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    pub fn secret(&self) -> Option<&SharedSecret> {
        self.secret.as_ref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.state == ChatState::Encrypted
    }

    /// The first participant that is not `me`.
    pub fn peer_of(&self, me: Uuid) -> Option<Uuid> {
        self.participants.iter().copied().find(|p| *p != me)
    }

    /// Store the shared secret and derive session keys from it.
    pub fn install_secret(&mut self, secret: SharedSecret) -> Result<&SessionKeys, EngineError> {
        let keys = derive_keys(&secret)?;
        self.secret = Some(secret);
        Ok(self.keys.insert(keys))
    }

    /// Move to `next`. Returns `Ok(false)` if already there.
    pub fn advance(&mut self, next: ChatState) -> Result<bool, EngineError> {
        if self.state == next {
            return Ok(false);
        }
        if !self.state.can_advance_to(next) {
            return Err(EngineError::InvalidTransition {
                chat_id: self.id,
                from: self.state,
                to: next,
            });
        }
        if next == ChatState::Encrypted && self.keys.is_none() {
            return Err(EngineError::MissingKeys(self.id));
        }
        self.state = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> Chat {
        Chat::new(Uuid::new_v4(), "bob", vec![Uuid::new_v4(), Uuid::new_v4()])
    }

    #[test]
    fn cannot_encrypt_without_keys() {
        let mut chat = chat();
        assert!(chat.advance(ChatState::KeyExchangePending).unwrap());
        assert!(matches!(
            chat.advance(ChatState::Encrypted),
            Err(EngineError::MissingKeys(_))
        ));

        chat.install_secret(SharedSecret::from_bytes([3u8; 32])).unwrap();
        assert!(chat.advance(ChatState::Encrypted).unwrap());
        assert!(!chat.advance(ChatState::Encrypted).unwrap());
    }

    #[test]
    fn state_never_moves_backwards() {
        let mut chat = chat();
        chat.install_secret(SharedSecret::from_bytes([3u8; 32])).unwrap();
        chat.advance(ChatState::Encrypted).unwrap();
        assert!(matches!(
            chat.advance(ChatState::KeyExchangePending),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert_eq!(chat.state(), ChatState::Encrypted);
    }

    #[test]
    fn restore_without_secret_drops_back_to_pending() {
        let mut record = chat().to_record();
        record.state = ChatState::Encrypted;

        let restored = Chat::restore(record.clone(), None).unwrap();
        assert_eq!(restored.state(), ChatState::KeyExchangePending);

        let restored = Chat::restore(record, Some(SharedSecret::from_bytes([1u8; 32]))).unwrap();
        assert!(restored.is_encrypted());
        assert!(restored.keys().is_some());
    }

    #[test]
    fn peer_is_the_other_participant() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        let chat = Chat::new(Uuid::new_v4(), "x", vec![them, me]);
        assert_eq!(chat.peer_of(me), Some(them));
    }
}
