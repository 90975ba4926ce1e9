//! Key exchange, friend flow and message handling.
//!
//! Handshake for one chat, initiator A and responder B:
//!
//!   A: initiate      nonce + [sign(nonce), sign(curve)], state PENDING ──▶ request
//!   B: reciprocate   verify, compute secret, derive keys, PENDING     ──▶ response
//!   A: confirm       verify, compute secret, derive keys, ENCRYPTED   ──▶ confirmation
//!   B: finalize      PENDING -> ENCRYPTED                             ──▶ confirmation
//!   A:               already ENCRYPTED, no-op
//!
//! Both sides derive identical keys because X25519 is symmetric and HKDF is
//! deterministic. Persistence runs after the in-core state and any outbound
//! message, so a store failure is reported without stalling the handshake.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rc_crypto::{
    aead, compute_shared_secret, random_nonce, verify_ed_signatures, CryptoError,
};
use rc_proto::{
    exchange::nonce_has_valid_len, ChatState, Direction, EncryptedEnvelope, FriendRequest,
    FriendResponse, KeyExchangeConfirmation, KeyExchangeRequest, KeyExchangeResponse,
    StreamPayload,
};
use rc_store::{ChatStore, MessageRecord, UserDetails};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    cache::ChatCache,
    chat::Chat,
    error::{EngineError, HandlerOutcome},
    identity::LocalIdentity,
    pool::MessageHandler,
    transport::Transport,
};

/// The single handshake and message engine. Cheap to clone.
#[derive(Clone)]
pub struct Protocol {
    identity: Arc<LocalIdentity>,
    cache: Arc<ChatCache>,
    store: Arc<dyn ChatStore>,
    transport: Arc<dyn Transport>,
}

impl Protocol {
    pub fn new(
        identity: Arc<LocalIdentity>,
        cache: Arc<ChatCache>,
        store: Arc<dyn ChatStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            identity,
            cache,
            store,
            transport,
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn cache(&self) -> &Arc<ChatCache> {
        &self.cache
    }

    fn me(&self) -> Uuid {
        self.identity.user_id
    }

    // ── Interactive entry points ─────────────────────────────────────────────

    /// Send our identity bundle to `target_id`. Returns the invite id.
    pub async fn send_friend_request(&self, target_id: Uuid) -> Result<Uuid, EngineError> {
        let invite_id = Uuid::new_v4();
        self.cache.insert_outgoing_invite(invite_id, target_id);
        self.transport
            .send(StreamPayload::FriendRequest(FriendRequest {
                invite_id,
                target_id,
                requester: self.identity.bundle(),
            }))
            .await?;
        info!(invite_id = %invite_id, target = %target_id, "friend request sent");
        Ok(invite_id)
    }

    /// Answer a pending inbound friend request. Accepting saves the
    /// requester to the address book before replying.
    pub async fn respond_friend_request(&self, invite_id: Uuid, accept: bool) -> Result<(), EngineError> {
        let request = self
            .cache
            .take_friend_request(invite_id)
            .ok_or(EngineError::UnknownInvite(invite_id))?;

        if accept {
            self.store
                .save_user_details(&UserDetails::from(&request.requester))
                .await?;
        }

        self.transport
            .send(StreamPayload::FriendResponse(FriendResponse {
                invite_id,
                target_id: request.requester.user_id,
                accepted: accept,
                responder: self.identity.bundle(),
            }))
            .await?;
        info!(
            invite_id = %invite_id,
            requester = %request.requester.user_id,
            accepted = accept,
            "friend request answered"
        );
        Ok(())
    }

    pub fn pending_friend_requests(&self) -> Vec<FriendRequest> {
        self.cache.friend_requests()
    }

    /// Open (or reuse) the chat with a known peer and start a key exchange.
    pub async fn begin_chat(&self, peer_id: Uuid) -> Result<Uuid, EngineError> {
        let peer = self.known_peer(peer_id).await?;
        let chat_id = match self.cache.find_chat_with(peer_id) {
            Some(chat) => chat.id,
            None => {
                let id = Uuid::new_v4();
                let me = self.me();
                self.cache
                    .get_or_create(id, || Chat::new(id, peer.username.clone(), vec![me, peer_id]));
                debug!(chat_id = %id, peer = %peer_id, "chat created");
                id
            }
        };
        self.initiate_key_exchange(chat_id).await?;
        Ok(chat_id)
    }

    /// Step 1: sign fresh handshake material and send a request.
    pub async fn initiate_key_exchange(&self, chat_id: Uuid) -> Result<HandlerOutcome, EngineError> {
        let chat = self.cache.get(chat_id).ok_or(EngineError::UnknownChat(chat_id))?;
        if chat.is_encrypted() {
            return Ok(HandlerOutcome::Ignored("chat already encrypted"));
        }
        let peer = self.peer_of(&chat)?;

        self.cache.advance_state(chat_id, ChatState::KeyExchangePending)?;
        let (nonce, signatures) = self.handshake_material();
        self.transport
            .send(StreamPayload::KeyExchangeRequest(KeyExchangeRequest {
                chat_id,
                sender_id: self.me(),
                target_id: peer,
                curve_public_key: self.identity.encryption.public_bytes().to_vec(),
                nonce,
                signatures,
            }))
            .await?;
        info!(chat_id = %chat_id, peer = %peer, "key exchange initiated");

        self.persist(chat_id).await?;
        Ok(HandlerOutcome::Handled)
    }

    /// Tell the chat's peer whether our side holds working keys.
    pub async fn confirm_key_exchange(&self, chat_id: Uuid) -> Result<(), EngineError> {
        let chat = self.cache.get(chat_id).ok_or(EngineError::UnknownChat(chat_id))?;
        let peer = self.peer_of(&chat)?;
        self.send_confirmation(chat_id, peer, chat.is_encrypted()).await
    }

    /// Encrypt and send a text message on an encrypted chat.
    pub async fn send_message(&self, chat_id: Uuid, text: &str) -> Result<MessageRecord, EngineError> {
        let chat = self.cache.get(chat_id).ok_or(EngineError::UnknownChat(chat_id))?;
        if !chat.is_encrypted() {
            return Err(EngineError::NotEncrypted(chat_id));
        }
        let keys = chat.keys().ok_or(EngineError::MissingKeys(chat_id))?;
        let peer = self.peer_of(&chat)?;
        let ciphertext = aead::encrypt(keys.enc_key(), text.as_bytes())?;

        let message_id = Uuid::new_v4();
        let sent_at_ms = Utc::now().timestamp_millis();
        self.transport
            .send(StreamPayload::Envelope(EncryptedEnvelope {
                message_id,
                sender_id: self.me(),
                chat_id,
                sent_at_ms,
                ciphertext,
            }))
            .await?;

        let record = MessageRecord {
            id: message_id,
            chat_id,
            from_id: self.me(),
            to_id: peer,
            direction: Direction::Outgoing,
            plaintext: text.to_owned(),
            sent_at_ms,
        };
        self.store.save_message(&record).await?;
        Ok(record)
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.cache.chats()
    }

    pub async fn messages(&self, chat_id: Uuid) -> Result<Vec<MessageRecord>, EngineError> {
        Ok(self.store.get_messages(chat_id).await?)
    }

    /// Load stored chats into the cache. A secret that cannot be unsealed
    /// is skipped and the chat comes back without keys.
    pub async fn restore(&self) -> Result<usize, EngineError> {
        let mut restored = 0;
        for record in self.store.get_chats().await? {
            let secret = match self.store.load_chat_secret(record.id).await {
                Ok(secret) => secret,
                Err(err) => {
                    warn!(chat_id = %record.id, error = %err, "chat secret unavailable");
                    None
                }
            };
            if self.cache.restore(Chat::restore(record, secret)?) {
                restored += 1;
            }
        }
        info!(restored, "chats restored from store");
        Ok(restored)
    }

    // ── Inbound handlers ─────────────────────────────────────────────────────

    pub async fn handle(&self, payload: StreamPayload) -> Result<HandlerOutcome, EngineError> {
        if payload.target_id().is_some_and(|target| target != self.me()) {
            return Ok(HandlerOutcome::Ignored("not addressed to local user"));
        }
        match payload {
            StreamPayload::Envelope(envelope) => self.handle_envelope(envelope).await,
            StreamPayload::FriendRequest(request) => Ok(self.handle_friend_request(request)),
            StreamPayload::FriendResponse(response) => self.handle_friend_response(response).await,
            StreamPayload::KeyExchangeRequest(request) => {
                self.handle_key_exchange_request(request).await
            }
            StreamPayload::KeyExchangeResponse(response) => {
                self.handle_key_exchange_response(response).await
            }
            StreamPayload::KeyExchangeConfirmation(confirmation) => {
                self.handle_key_exchange_confirmation(confirmation).await
            }
            StreamPayload::Unknown => Ok(HandlerOutcome::Ignored("unknown payload")),
        }
    }

    fn handle_friend_request(&self, request: FriendRequest) -> HandlerOutcome {
        if request.requester.user_id == self.me() {
            return HandlerOutcome::Ignored("friend request from self");
        }
        info!(
            invite_id = %request.invite_id,
            requester = %request.requester.user_id,
            username = %request.requester.username,
            "friend request received"
        );
        self.cache.insert_friend_request(request);
        HandlerOutcome::Handled
    }

    async fn handle_friend_response(&self, response: FriendResponse) -> Result<HandlerOutcome, EngineError> {
        let Some(invited) = self.cache.take_outgoing_invite(response.invite_id) else {
            warn!(invite_id = %response.invite_id, "friend response for unknown invite");
            return Ok(HandlerOutcome::Ignored("unknown invite"));
        };
        if invited != response.responder.user_id {
            warn!(
                invite_id = %response.invite_id,
                expected = %invited,
                got = %response.responder.user_id,
                "friend response from unexpected user"
            );
            self.cache.insert_outgoing_invite(response.invite_id, invited);
            return Ok(HandlerOutcome::Ignored("responder does not match invite"));
        }
        if !response.accepted {
            info!(invite_id = %response.invite_id, peer = %invited, "friend request declined");
            return Ok(HandlerOutcome::Handled);
        }

        self.store
            .save_user_details(&UserDetails::from(&response.responder))
            .await?;
        info!(peer = %invited, "friend request accepted, starting key exchange");
        self.begin_chat(invited).await?;
        Ok(HandlerOutcome::Handled)
    }

    /// Step 2: the responder verifies the request, answers with its own
    /// material and derives keys. It stays PENDING until confirmed.
    async fn handle_key_exchange_request(
        &self,
        request: KeyExchangeRequest,
    ) -> Result<HandlerOutcome, EngineError> {
        let chat_id = request.chat_id;
        let peer = self.known_peer(request.sender_id).await?;
        verify_handshake(
            chat_id,
            &peer,
            &request.nonce,
            &request.curve_public_key,
            &request.signatures,
        )?;
        let secret = compute_shared_secret(&self.identity.encryption, &request.curve_public_key)?;

        let me = self.me();
        let (chat, created) = self.cache.get_or_create(chat_id, || {
            Chat::new(chat_id, peer.username.clone(), vec![request.sender_id, me])
        });
        if chat.is_encrypted() {
            info!(chat_id = %chat_id, "key exchange request for encrypted chat ignored");
            return Ok(HandlerOutcome::Ignored("chat already encrypted"));
        }
        if !chat.participants.contains(&request.sender_id) {
            return Err(EngineError::ExchangeFailed {
                chat_id,
                reason: "sender is not a participant".into(),
            });
        }

        self.cache.install_secret(chat_id, secret)?;
        self.cache.advance_state(chat_id, ChatState::KeyExchangePending)?;

        let (nonce, signatures) = self.handshake_material();
        self.transport
            .send(StreamPayload::KeyExchangeResponse(KeyExchangeResponse {
                chat_id,
                sender_id: me,
                target_id: request.sender_id,
                curve_public_key: self.identity.encryption.public_bytes().to_vec(),
                nonce,
                signatures,
            }))
            .await?;
        info!(chat_id = %chat_id, peer = %request.sender_id, created, "key exchange response sent");

        self.persist(chat_id).await?;
        Ok(HandlerOutcome::Handled)
    }

    /// Step 4: the initiator verifies the response, derives the same keys,
    /// marks the chat ENCRYPTED and confirms.
    async fn handle_key_exchange_response(
        &self,
        response: KeyExchangeResponse,
    ) -> Result<HandlerOutcome, EngineError> {
        let chat_id = response.chat_id;
        let Some(chat) = self.cache.get(chat_id) else {
            warn!(chat_id = %chat_id, sender = %response.sender_id, "key exchange response for unknown chat");
            return Ok(HandlerOutcome::Ignored("unknown chat"));
        };
        match chat.state() {
            ChatState::Encrypted => return Ok(HandlerOutcome::Ignored("chat already encrypted")),
            ChatState::Created => return Ok(HandlerOutcome::Ignored("no key exchange in progress")),
            ChatState::KeyExchangePending => {}
        }
        if !chat.participants.contains(&response.sender_id) {
            return Err(EngineError::ExchangeFailed {
                chat_id,
                reason: "sender is not a participant".into(),
            });
        }

        let peer = self.known_peer(response.sender_id).await?;
        verify_handshake(
            chat_id,
            &peer,
            &response.nonce,
            &response.curve_public_key,
            &response.signatures,
        )?;

        let secret = compute_shared_secret(&self.identity.encryption, &response.curve_public_key)?;
        self.cache.install_secret(chat_id, secret)?;
        if !self
            .cache
            .compare_and_set_state(chat_id, ChatState::KeyExchangePending, ChatState::Encrypted)?
        {
            return Ok(HandlerOutcome::Ignored("chat already encrypted"));
        }
        info!(chat_id = %chat_id, peer = %response.sender_id, "chat encrypted");

        self.send_confirmation(chat_id, response.sender_id, true).await?;
        self.persist(chat_id).await?;
        Ok(HandlerOutcome::Handled)
    }

    /// Steps 3 and 5. Only the PENDING -> ENCRYPTED transition answers with
    /// a confirmation, so a repeat on an encrypted chat sends nothing.
    async fn handle_key_exchange_confirmation(
        &self,
        confirmation: KeyExchangeConfirmation,
    ) -> Result<HandlerOutcome, EngineError> {
        let chat_id = confirmation.chat_id;
        let confirmer = confirmation.confirmer_id;
        let Some(chat) = self.cache.get(chat_id) else {
            warn!(chat_id = %chat_id, sender = %confirmer, "key exchange confirmation for unknown chat");
            return Ok(HandlerOutcome::Ignored("unknown chat"));
        };
        if confirmer == self.me() || !chat.participants.contains(&confirmer) {
            warn!(chat_id = %chat_id, sender = %confirmer, "confirmation from non-participant");
            return Ok(HandlerOutcome::Ignored("sender is not a participant"));
        }
        if !confirmation.success {
            return Err(EngineError::ExchangeFailed {
                chat_id,
                reason: format!("peer {confirmer} reported failure"),
            });
        }

        match chat.state() {
            ChatState::Encrypted => {
                debug!(chat_id = %chat_id, "repeat confirmation ignored");
                return Ok(HandlerOutcome::Ignored("chat already encrypted"));
            }
            ChatState::Created => return Ok(HandlerOutcome::Ignored("no key exchange in progress")),
            ChatState::KeyExchangePending => {}
        }

        if !self
            .cache
            .compare_and_set_state(chat_id, ChatState::KeyExchangePending, ChatState::Encrypted)?
        {
            return Ok(HandlerOutcome::Ignored("chat already encrypted"));
        }
        info!(chat_id = %chat_id, peer = %confirmer, "chat encrypted");

        self.send_confirmation(chat_id, confirmer, true).await?;
        self.persist(chat_id).await?;
        Ok(HandlerOutcome::Handled)
    }

    async fn handle_envelope(&self, envelope: EncryptedEnvelope) -> Result<HandlerOutcome, EngineError> {
        let chat_id = envelope.chat_id;
        let Some(chat) = self.cache.get(chat_id) else {
            warn!(chat_id = %chat_id, sender = %envelope.sender_id, "envelope for unknown chat");
            return Ok(HandlerOutcome::Ignored("unknown chat"));
        };
        if envelope.sender_id == self.me() {
            return Ok(HandlerOutcome::Ignored("own message echoed"));
        }
        if !chat.participants.contains(&envelope.sender_id) {
            warn!(chat_id = %chat_id, sender = %envelope.sender_id, "envelope from non-participant");
            return Ok(HandlerOutcome::Ignored("sender is not a participant"));
        }
        let Some(keys) = chat.keys() else {
            warn!(chat_id = %chat_id, "envelope before key exchange completed");
            return Ok(HandlerOutcome::Ignored("no session keys"));
        };

        let plaintext = aead::decrypt(keys.enc_key(), &envelope.ciphertext)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| EngineError::InvalidPayload("message body is not UTF-8".into()))?
            .to_owned();

        self.store
            .save_message(&MessageRecord {
                id: envelope.message_id,
                chat_id,
                from_id: envelope.sender_id,
                to_id: self.me(),
                direction: Direction::Incoming,
                plaintext: text,
                sent_at_ms: envelope.sent_at_ms,
            })
            .await?;
        debug!(chat_id = %chat_id, message_id = %envelope.message_id, "message stored");
        Ok(HandlerOutcome::Handled)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn known_peer(&self, peer_id: Uuid) -> Result<UserDetails, EngineError> {
        self.store
            .get_user_details(peer_id)
            .await?
            .ok_or(EngineError::UnknownPeer(peer_id))
    }

    fn peer_of(&self, chat: &Chat) -> Result<Uuid, EngineError> {
        chat.peer_of(self.me()).ok_or_else(|| EngineError::ExchangeFailed {
            chat_id: chat.id,
            reason: "chat has no peer".into(),
        })
    }

    fn handshake_material(&self) -> (Vec<u8>, Vec<Vec<u8>>) {
        let nonce = random_nonce().to_vec();
        let signatures = self
            .identity
            .signing
            .sign_handshake(&nonce, self.identity.encryption.public_bytes());
        (nonce, signatures)
    }

    async fn send_confirmation(&self, chat_id: Uuid, target_id: Uuid, success: bool) -> Result<(), EngineError> {
        self.transport
            .send(StreamPayload::KeyExchangeConfirmation(KeyExchangeConfirmation {
                chat_id,
                success,
                confirmer_id: self.me(),
                target_id,
            }))
            .await
    }

    /// Write the cached chat row, its state and its secret once installed.
    /// The store only moves state forward, so a handler that finishes late
    /// cannot overwrite a newer state written by another.
    async fn persist(&self, chat_id: Uuid) -> Result<(), EngineError> {
        let chat = self.cache.get(chat_id).ok_or(EngineError::UnknownChat(chat_id))?;
        self.store.create_chat(&chat.to_record()).await?;
        self.store.update_chat_state(chat.state(), chat_id).await?;
        if let Some(secret) = chat.secret() {
            self.store.save_chat_secret(chat_id, secret).await?;
        }
        Ok(())
    }
}

fn verify_handshake(
    chat_id: Uuid,
    signer: &UserDetails,
    nonce: &[u8],
    curve_public_key: &[u8],
    signatures: &[Vec<u8>],
) -> Result<(), EngineError> {
    if !nonce_has_valid_len(nonce) {
        return Err(EngineError::ExchangeFailed {
            chat_id,
            reason: format!("nonce must be 32 bytes, got {}", nonce.len()),
        });
    }
    if !verify_ed_signatures(&signer.sign_public_key, nonce, curve_public_key, signatures) {
        warn!(chat_id = %chat_id, signer = %signer.user_id, "handshake signature rejected");
        return Err(CryptoError::SignatureVerification.into());
    }
    Ok(())
}

#[async_trait]
impl MessageHandler for Protocol {
    async fn handle(&self, payload: StreamPayload) -> Result<HandlerOutcome, EngineError> {
        Protocol::handle(self, payload).await
    }
}
