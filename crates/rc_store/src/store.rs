//! The persistence contract the engine is written against.

use async_trait::async_trait;
use rc_crypto::SharedSecret;
use rc_proto::ChatState;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{ChatRecord, MessageRecord, UserDetails},
};

/// Every operation is a single parameterised statement (or the in-memory
/// equivalent). Implementations never hold derived session keys.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert a message; saving the same id twice is a no-op.
    async fn save_message(&self, message: &MessageRecord) -> Result<(), StoreError>;

    /// Insert or replace an address-book entry.
    async fn save_user_details(&self, user: &UserDetails) -> Result<(), StoreError>;

    async fn get_user_details(&self, user_id: Uuid) -> Result<Option<UserDetails>, StoreError>;

    /// Insert a chat row; an existing row with the same id is left untouched.
    async fn create_chat(&self, chat: &ChatRecord) -> Result<(), StoreError>;

    /// Move a chat forward to `state`. A `state` at or behind the stored one
    /// leaves the row unchanged.
    async fn update_chat_state(&self, state: ChatState, chat_id: Uuid) -> Result<(), StoreError>;

    async fn save_chat_secret(&self, chat_id: Uuid, secret: &SharedSecret) -> Result<(), StoreError>;

    async fn load_chat_secret(&self, chat_id: Uuid) -> Result<Option<SharedSecret>, StoreError>;

    async fn get_chats(&self) -> Result<Vec<ChatRecord>, StoreError>;

    /// Messages of one chat, oldest first.
    async fn get_messages(&self, chat_id: Uuid) -> Result<Vec<MessageRecord>, StoreError>;
}
