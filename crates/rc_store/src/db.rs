//! SQLite-backed `ChatStore` via sqlx.

use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rc_crypto::{kdf::generate_salt, SharedSecret};
use rc_proto::ChatState;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{ChatRecord, MessageRecord, UserDetails},
    store::ChatStore,
    vault::Vault,
};

const SALT_META_KEY: &str = "vault_salt";

/// Central store handle.  Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct SqliteStore {
    pub pool: SqlitePool,
    pub vault: Vault,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `db_path`.
    /// Runs all pending migrations automatically.
    ///
    /// WAL mode and foreign keys are set on the connection, not in a
    /// migration: SQLite refuses to change `journal_mode` inside the
    /// transaction sqlx wraps each migration in.
    pub async fn open(db_path: &Path, vault: Vault) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        info!(path = %db_path.display(), "chat store opened");
        Ok(Self { pool, vault })
    }

    /// Open the database and unlock its vault with `password`. The salt is
    /// generated on first open and kept in the `meta` table.
    pub async fn open_with_password(db_path: &Path, password: &[u8]) -> Result<Self, StoreError> {
        let store = Self::open(db_path, Vault::new()).await?;
        let salt = store.vault_salt().await?;
        store.vault.unlock(password, &salt).await?;
        Ok(store)
    }

    async fn vault_salt(&self) -> Result<[u8; 16], StoreError> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
                .bind(SALT_META_KEY)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(encoded) = existing {
            let raw = URL_SAFE_NO_PAD
                .decode(encoded)
                .map_err(|e| StoreError::Crypto(rc_crypto::CryptoError::Base64Decode(e)))?;
            return raw
                .try_into()
                .map_err(|_| StoreError::CorruptRow("vault salt has wrong length".into()));
        }

        let salt = generate_salt();
        sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
            .bind(SALT_META_KEY)
            .bind(URL_SAFE_NO_PAD.encode(salt))
            .execute(&self.pool)
            .await?;
        debug!("generated new vault salt");
        Ok(salt)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn encrypt_value(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        self.vault
            .with_key(|key| {
                let ct = rc_crypto::aead::encrypt(key, plaintext)?;
                Ok(URL_SAFE_NO_PAD.encode(ct))
            })
            .await
    }

    async fn decrypt_value(&self, b64: &str) -> Result<Vec<u8>, StoreError> {
        let ct = URL_SAFE_NO_PAD
            .decode(b64)
            .map_err(|e| StoreError::Crypto(rc_crypto::CryptoError::Base64Decode(e)))?;

        self.vault
            .with_key(|key| {
                let pt = rc_crypto::aead::decrypt(key, &ct)?;
                Ok(pt.to_vec())
            })
            .await
    }
}

// ── Row types ────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: String,
    name: String,
    participants: String,
    state: String,
}

impl TryFrom<ChatRow> for ChatRecord {
    type Error = StoreError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            name: row.name,
            participants: serde_json::from_str(&row.participants)?,
            state: row.state.parse().map_err(StoreError::CorruptRow)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    chat_id: String,
    from_id: String,
    to_id: String,
    direction: String,
    body: String,
    sent_at_ms: i64,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            chat_id: parse_uuid(&row.chat_id)?,
            from_id: parse_uuid(&row.from_id)?,
            to_id: parse_uuid(&row.to_id)?,
            direction: row.direction.parse().map_err(StoreError::CorruptRow)?,
            plaintext: row.body,
            sent_at_ms: row.sent_at_ms,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    username: String,
    enc_public_key: Vec<u8>,
    sign_public_key: Vec<u8>,
}

impl TryFrom<UserRow> for UserDetails {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: parse_uuid(&row.user_id)?,
            username: row.username,
            enc_public_key: row.enc_public_key,
            sign_public_key: row.sign_public_key,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::CorruptRow(format!("bad uuid {s:?}: {e}")))
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn save_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO messages (id, chat_id, from_id, to_id, direction, body, sent_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.chat_id.to_string())
        .bind(message.from_id.to_string())
        .bind(message.to_id.to_string())
        .bind(message.direction.as_str())
        .bind(&message.plaintext)
        .bind(message.sent_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_user_details(&self, user: &UserDetails) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO address_book (user_id, username, enc_public_key, sign_public_key) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               username = excluded.username, \
               enc_public_key = excluded.enc_public_key, \
               sign_public_key = excluded.sign_public_key",
        )
        .bind(user.user_id.to_string())
        .bind(&user.username)
        .bind(&user.enc_public_key)
        .bind(&user.sign_public_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_details(&self, user_id: Uuid) -> Result<Option<UserDetails>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_id, username, enc_public_key, sign_public_key FROM address_book WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserDetails::try_from).transpose()
    }

    async fn create_chat(&self, chat: &ChatRecord) -> Result<(), StoreError> {
        let participants = serde_json::to_string(&chat.participants)?;
        sqlx::query(
            "INSERT INTO chats (id, name, participants, state) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(chat.id.to_string())
        .bind(&chat.name)
        .bind(participants)
        .bind(chat.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_chat_state(&self, state: ChatState, chat_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE chats SET state = ? WHERE id = ? AND \
             (CASE state WHEN 'CREATED' THEN 0 WHEN 'KEY_EXCHANGE_PENDING' THEN 1 ELSE 2 END) < ?",
        )
        .bind(state.as_str())
        .bind(chat_id.to_string())
        .bind(state as i64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            return Err(StoreError::NotFound(format!("chat {chat_id}")));
        }
        debug!(chat_id = %chat_id, state = %state, "stored chat state already at or past target");
        Ok(())
    }

    async fn save_chat_secret(&self, chat_id: Uuid, secret: &SharedSecret) -> Result<(), StoreError> {
        let sealed = self.encrypt_value(secret.as_bytes()).await?;
        let result = sqlx::query("UPDATE chats SET secret_enc = ? WHERE id = ?")
            .bind(sealed)
            .bind(chat_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("chat {chat_id}")));
        }
        Ok(())
    }

    async fn load_chat_secret(&self, chat_id: Uuid) -> Result<Option<SharedSecret>, StoreError> {
        let sealed: Option<Option<String>> =
            sqlx::query_scalar("SELECT secret_enc FROM chats WHERE id = ?")
                .bind(chat_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match sealed.flatten() {
            Some(b64) => {
                let raw = self.decrypt_value(&b64).await?;
                Ok(Some(SharedSecret::from_slice(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn get_chats(&self) -> Result<Vec<ChatRecord>, StoreError> {
        let rows: Vec<ChatRow> =
            sqlx::query_as("SELECT id, name, participants, state FROM chats ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ChatRecord::try_from).collect()
    }

    async fn get_messages(&self, chat_id: Uuid) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, chat_id, from_id, to_id, direction, body, sent_at_ms FROM messages \
             WHERE chat_id = ? ORDER BY sent_at_ms, rowid",
        )
        .bind(chat_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MessageRecord::try_from).collect()
    }
}
