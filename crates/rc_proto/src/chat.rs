//! Chat state lattice and message direction, shared with storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Encryption state of a chat. Only ever advances, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatState {
    #[default]
    Created,
    KeyExchangePending,
    Encrypted,
}

impl ChatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::KeyExchangePending => "KEY_EXCHANGE_PENDING",
            Self::Encrypted => "ENCRYPTED",
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only order.
    /// Staying put counts as allowed.
    pub fn can_advance_to(&self, next: ChatState) -> bool {
        next >= *self
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "KEY_EXCHANGE_PENDING" => Ok(Self::KeyExchangePending),
            "ENCRYPTED" => Ok(Self::Encrypted),
            other => Err(format!("unknown chat state {other:?}")),
        }
    }
}

/// Which way a stored message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            other => Err(format!("unknown direction {other:?}")),
        }
    }
}
