//! rc_proto: Wire types and serialisation for Relaychat
//!
//! Everything a client puts on the relay stream is one `StreamPayload`,
//! serialised to JSON with an internal `"type"` tag. Binary fields are
//! base64url (no padding).
//!
//! # Modules
//! - `stream`: the `StreamPayload` union and its `PayloadKind` classifier
//! - `envelope`: encrypted chat message envelope (what the relay sees)
//! - `exchange`: key-exchange request / response / confirmation
//! - `friend`: friend requests, responses, identity bundles
//! - `chat`: chat state lattice and message direction shared with storage
//! - `codec`: JSON framing and base64 field helpers

pub mod chat;
pub mod codec;
pub mod envelope;
pub mod exchange;
pub mod friend;
pub mod stream;

pub use chat::{ChatState, Direction};
pub use codec::{decode_frame, encode_frame, CodecError};
pub use envelope::EncryptedEnvelope;
pub use exchange::{KeyExchangeConfirmation, KeyExchangeRequest, KeyExchangeResponse};
pub use friend::{FriendRequest, FriendResponse, IdentityBundle};
pub use stream::{PayloadKind, StreamPayload};
