//! Wire codec: JSON framing for stream payloads.
//!
//! One frame is one JSON document holding one `StreamPayload`. The transport
//! below us already delimits frames, so no length prefix is added here.

use crate::stream::StreamPayload;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encode a payload into one wire frame.
pub fn encode_frame(payload: &StreamPayload) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(payload)?)
}

/// Decode one wire frame. Unrecognised `"type"` tags decode to
/// `StreamPayload::Unknown` rather than failing.
pub fn decode_frame(frame: &[u8]) -> Result<StreamPayload, CodecError> {
    Ok(serde_json::from_slice(frame)?)
}

/// `Vec<u8>` <-> base64url string.
pub(crate) mod b64 {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// `Vec<Vec<u8>>` <-> list of base64url strings (signature pairs).
pub(crate) mod b64_list {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{self, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&URL_SAFE_NO_PAD.encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        raw.iter()
            .map(|s| URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exchange::KeyExchangeConfirmation, stream::PayloadKind};
    use uuid::Uuid;

    #[test]
    fn unknown_tag_decodes_to_unknown() {
        let payload = decode_frame(br#"{"type":"typing_indicator","typing":true}"#).unwrap();
        assert!(matches!(payload, StreamPayload::Unknown));
        assert_eq!(payload.kind(), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_frame(b"not json").is_err());
        assert!(decode_frame(br#"{"no_tag":1}"#).is_err());
    }

    #[test]
    fn frame_carries_type_tag() {
        let payload = StreamPayload::KeyExchangeConfirmation(KeyExchangeConfirmation {
            chat_id: Uuid::new_v4(),
            success: true,
            confirmer_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
        });
        let frame = encode_frame(&payload).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "key_exchange_confirmation");

        let back = decode_frame(&frame).unwrap();
        assert_eq!(back.kind(), Some(PayloadKind::KeyExchangeConfirmation));
    }
}
