//! Chat/Friend cache shared by every handler task.
//!
//! One `parking_lot::Mutex` guards all of it. Each method takes the lock,
//! does a complete read-modify-write and releases it, so callers never hold
//! it across an `.await`. Reads hand out clones.

use std::collections::HashMap;

use parking_lot::Mutex;
use rc_crypto::{SessionKeys, SharedSecret};
use rc_proto::{ChatState, FriendRequest};
use uuid::Uuid;

use crate::{chat::Chat, error::EngineError};

#[derive(Default)]
struct CacheInner {
    chats: HashMap<Uuid, Chat>,
    /// Inbound friend requests awaiting the local user's answer, by invite id.
    friend_requests: HashMap<Uuid, FriendRequest>,
    /// Invites we sent, invite id -> target user id.
    outgoing_invites: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct ChatCache {
    inner: Mutex<CacheInner>,
}

impl ChatCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Chats ────────────────────────────────────────────────────────────────

    /// Return the chat with `id`, inserting `make()` first if absent. The
    /// flag is true when this call created it.
    pub fn get_or_create<F>(&self, id: Uuid, make: F) -> (Chat, bool)
    where
        F: FnOnce() -> Chat,
    {
        let mut inner = self.inner.lock();
        let mut created = false;
        let chat = inner.chats.entry(id).or_insert_with(|| {
            created = true;
            make()
        });
        (chat.clone(), created)
    }

    pub fn get(&self, id: Uuid) -> Option<Chat> {
        self.inner.lock().chats.get(&id).cloned()
    }

    pub fn state(&self, id: Uuid) -> Option<ChatState> {
        self.inner.lock().chats.get(&id).map(Chat::state)
    }

    /// All chats, ordered by name then id.
    pub fn chats(&self) -> Vec<Chat> {
        let mut chats: Vec<Chat> = self.inner.lock().chats.values().cloned().collect();
        chats.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        chats
    }

    /// An existing chat with `peer` among its participants.
    pub fn find_chat_with(&self, peer: Uuid) -> Option<Chat> {
        self.inner
            .lock()
            .chats
            .values()
            .find(|c| c.participants.contains(&peer))
            .cloned()
    }

    /// Move the chat to `next` only if it is currently in `expected`.
    ///
    /// `Ok(false)` means the current state differs and nothing changed; only
    /// one of several racing callers observes `Ok(true)`.
    pub fn compare_and_set_state(
        &self,
        id: Uuid,
        expected: ChatState,
        next: ChatState,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock();
        let chat = inner.chats.get_mut(&id).ok_or(EngineError::UnknownChat(id))?;
        if chat.state() != expected {
            return Ok(false);
        }
        chat.advance(next)
    }

    /// Advance to `next` from any earlier state. Returns the state before
    /// the call.
    pub fn advance_state(&self, id: Uuid, next: ChatState) -> Result<ChatState, EngineError> {
        let mut inner = self.inner.lock();
        let chat = inner.chats.get_mut(&id).ok_or(EngineError::UnknownChat(id))?;
        let before = chat.state();
        chat.advance(next)?;
        Ok(before)
    }

    /// Install the shared secret for a chat and return the derived keys.
    pub fn install_secret(&self, id: Uuid, secret: SharedSecret) -> Result<SessionKeys, EngineError> {
        let mut inner = self.inner.lock();
        let chat = inner.chats.get_mut(&id).ok_or(EngineError::UnknownChat(id))?;
        chat.install_secret(secret).cloned()
    }

    /// Insert a chat rebuilt from storage unless one is already cached.
    pub fn restore(&self, chat: Chat) -> bool {
        let mut inner = self.inner.lock();
        if inner.chats.contains_key(&chat.id) {
            return false;
        }
        inner.chats.insert(chat.id, chat);
        true
    }

    // ── Friend traffic ───────────────────────────────────────────────────────

    pub fn insert_friend_request(&self, request: FriendRequest) {
        self.inner
            .lock()
            .friend_requests
            .insert(request.invite_id, request);
    }

    pub fn take_friend_request(&self, invite_id: Uuid) -> Option<FriendRequest> {
        self.inner.lock().friend_requests.remove(&invite_id)
    }

    pub fn friend_requests(&self) -> Vec<FriendRequest> {
        let mut pending: Vec<FriendRequest> =
            self.inner.lock().friend_requests.values().cloned().collect();
        pending.sort_by(|a, b| a.requester.username.cmp(&b.requester.username));
        pending
    }

    pub fn insert_outgoing_invite(&self, invite_id: Uuid, target_id: Uuid) {
        self.inner.lock().outgoing_invites.insert(invite_id, target_id);
    }

    pub fn take_outgoing_invite(&self, invite_id: Uuid) -> Option<Uuid> {
        self.inner.lock().outgoing_invites.remove(&invite_id)
    }
}
