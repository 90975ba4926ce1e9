//! rc_engine: Key exchange and message routing for Relaychat
//!
//! Inbound payloads from the relay go through the `Demultiplexer` into one
//! bounded mailbox per payload kind. Each mailbox is drained by a
//! `WorkerPool` that runs the `Protocol` handler: decrypt-and-persist for
//! envelopes, one handshake step for key-exchange messages, cache insert
//! for friend traffic. The `ChatCache` holds the in-core state all handlers
//! share; `ChatStore` persists it.
//!
//! # Modules
//! - `protocol`: handshake state machine, friend flow, send/receive
//! - `demux`: tag-based routing with drop-on-full mailboxes
//! - `pool`: permanent + ephemeral workers and the backlog monitor
//! - `cache`: chat and invite state behind one lock
//! - `engine`: wires it together and owns shutdown

pub mod cache;
pub mod chat;
pub mod config;
pub mod demux;
pub mod engine;
pub mod error;
pub mod identity;
pub mod logging;
pub mod mailbox;
pub mod pool;
pub mod protocol;
pub mod transport;

pub use cache::ChatCache;
pub use chat::Chat;
pub use config::{EngineConfig, PoolConfig};
pub use demux::{Demultiplexer, DispatchOutcome};
pub use engine::Engine;
pub use error::{EngineError, HandlerOutcome};
pub use identity::LocalIdentity;
pub use mailbox::Mailbox;
pub use pool::{MessageHandler, PoolCounter, WorkerPool};
pub use protocol::Protocol;
pub use transport::{ChannelTransport, Transport};
