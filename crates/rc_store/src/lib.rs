//! rc_store: Chat persistence for Relaychat
//!
//! The engine only ever talks to the `ChatStore` trait: save/query chats,
//! messages and address-book entries through parameterised operations. Two
//! implementations ship here:
//! - `MemoryStore`: process-local maps, used by tests and throwaway sessions.
//! - `SqliteStore`: SQLite via sqlx, migrations embedded at build time.
//!
//! # Encryption at rest
//! Chat rows never hold derived session keys. The one piece of key material
//! persisted, the per-chat X25519 shared secret, is sealed with AES-256-GCM
//! under a vault key derived from the user password via Argon2id and held in
//! memory only while the vault is unlocked.

pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod store;
pub mod vault;

pub use db::SqliteStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{ChatRecord, MessageRecord, UserDetails};
pub use store::ChatStore;
pub use vault::Vault;
