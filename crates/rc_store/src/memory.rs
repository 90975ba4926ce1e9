//! In-memory `ChatStore`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rc_crypto::SharedSecret;
use rc_proto::ChatState;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{ChatRecord, MessageRecord, UserDetails},
    store::ChatStore,
};

#[derive(Default)]
struct MemoryInner {
    chats: Vec<ChatRecord>,
    secrets: HashMap<Uuid, SharedSecret>,
    messages: Vec<MessageRecord>,
    address_book: HashMap<Uuid, UserDetails>,
}

/// Process-local store. Writes can be switched off to exercise the engine's
/// handling of persistence failures.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn save_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        if !inner.messages.iter().any(|m| m.id == message.id) {
            inner.messages.push(message.clone());
        }
        Ok(())
    }

    async fn save_user_details(&self, user: &UserDetails) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.lock().address_book.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn get_user_details(&self, user_id: Uuid) -> Result<Option<UserDetails>, StoreError> {
        Ok(self.inner.lock().address_book.get(&user_id).cloned())
    }

    async fn create_chat(&self, chat: &ChatRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        if !inner.chats.iter().any(|c| c.id == chat.id) {
            inner.chats.push(chat.clone());
        }
        Ok(())
    }

    async fn update_chat_state(&self, state: ChatState, chat_id: Uuid) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        let chat = inner
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| StoreError::NotFound(format!("chat {chat_id}")))?;
        if chat.state.can_advance_to(state) {
            chat.state = state;
        }
        Ok(())
    }

    async fn save_chat_secret(&self, chat_id: Uuid, secret: &SharedSecret) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.lock().secrets.insert(chat_id, secret.clone());
        Ok(())
    }

    async fn load_chat_secret(&self, chat_id: Uuid) -> Result<Option<SharedSecret>, StoreError> {
        Ok(self.inner.lock().secrets.get(&chat_id).cloned())
    }

    async fn get_chats(&self) -> Result<Vec<ChatRecord>, StoreError> {
        Ok(self.inner.lock().chats.clone())
    }

    async fn get_messages(&self, chat_id: Uuid) -> Result<Vec<MessageRecord>, StoreError> {
        let mut messages: Vec<MessageRecord> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sent_at_ms);
        Ok(messages)
    }
}
