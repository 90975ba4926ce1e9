//! The stream payload union, the unit the demultiplexer classifies on.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    envelope::EncryptedEnvelope,
    exchange::{KeyExchangeConfirmation, KeyExchangeRequest, KeyExchangeResponse},
    friend::{FriendRequest, FriendResponse},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPayload {
    Envelope(EncryptedEnvelope),
    FriendRequest(FriendRequest),
    FriendResponse(FriendResponse),
    KeyExchangeRequest(KeyExchangeRequest),
    KeyExchangeResponse(KeyExchangeResponse),
    KeyExchangeConfirmation(KeyExchangeConfirmation),
    /// Any tag this build does not recognise.
    #[serde(other)]
    Unknown,
}

/// One mailbox per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Envelope,
    FriendRequest,
    FriendResponse,
    KeyExchangeRequest,
    KeyExchangeResponse,
    KeyExchangeConfirmation,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 6] = [
        PayloadKind::Envelope,
        PayloadKind::FriendRequest,
        PayloadKind::FriendResponse,
        PayloadKind::KeyExchangeRequest,
        PayloadKind::KeyExchangeResponse,
        PayloadKind::KeyExchangeConfirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Envelope => "envelope",
            Self::FriendRequest => "friend_request",
            Self::FriendResponse => "friend_response",
            Self::KeyExchangeRequest => "key_exchange_request",
            Self::KeyExchangeResponse => "key_exchange_response",
            Self::KeyExchangeConfirmation => "key_exchange_confirmation",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamPayload {
    /// The mailbox this payload belongs to; `None` for unknown tags.
    pub fn kind(&self) -> Option<PayloadKind> {
        match self {
            Self::Envelope(_) => Some(PayloadKind::Envelope),
            Self::FriendRequest(_) => Some(PayloadKind::FriendRequest),
            Self::FriendResponse(_) => Some(PayloadKind::FriendResponse),
            Self::KeyExchangeRequest(_) => Some(PayloadKind::KeyExchangeRequest),
            Self::KeyExchangeResponse(_) => Some(PayloadKind::KeyExchangeResponse),
            Self::KeyExchangeConfirmation(_) => Some(PayloadKind::KeyExchangeConfirmation),
            Self::Unknown => None,
        }
    }

    /// Originating user, for logging and drop warnings.
    pub fn sender_id(&self) -> Option<Uuid> {
        match self {
            Self::Envelope(e) => Some(e.sender_id),
            Self::FriendRequest(r) => Some(r.requester.user_id),
            Self::FriendResponse(r) => Some(r.responder.user_id),
            Self::KeyExchangeRequest(r) => Some(r.sender_id),
            Self::KeyExchangeResponse(r) => Some(r.sender_id),
            Self::KeyExchangeConfirmation(c) => Some(c.confirmer_id),
            Self::Unknown => None,
        }
    }

    /// Addressed user. Envelopes are addressed by chat membership instead and
    /// return `None`.
    pub fn target_id(&self) -> Option<Uuid> {
        match self {
            Self::FriendRequest(r) => Some(r.target_id),
            Self::FriendResponse(r) => Some(r.target_id),
            Self::KeyExchangeRequest(r) => Some(r.target_id),
            Self::KeyExchangeResponse(r) => Some(r.target_id),
            Self::KeyExchangeConfirmation(c) => Some(c.target_id),
            Self::Envelope(_) | Self::Unknown => None,
        }
    }
}
