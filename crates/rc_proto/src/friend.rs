//! Friend requests and the identity bundle they carry.
//!
//! Accepting a friend request is how a user learns a peer's signing key;
//! the bundle is saved to the address book and later used to authenticate
//! that peer's key-exchange messages.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::b64;

/// Public identity of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityBundle {
    pub user_id: Uuid,
    pub username: String,
    /// X25519 public key
    #[serde(with = "b64")]
    pub curve_public_key: Vec<u8>,
    /// Ed25519 public key
    #[serde(with = "b64")]
    pub signing_public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub invite_id: Uuid,
    pub target_id: Uuid,
    pub requester: IdentityBundle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendResponse {
    pub invite_id: Uuid,
    pub target_id: Uuid,
    pub accepted: bool,
    pub responder: IdentityBundle,
}
