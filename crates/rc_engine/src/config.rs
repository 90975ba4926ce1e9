//! Engine configuration: mailbox sizes, pool bounds and timers.
//!
//! Defaults suit an interactive client. A JSON file may override any subset
//! of fields; `RC_MONITOR_TICK_MS` and `RC_IDLE_TIMEOUT_MS` override the
//! timers last.

use std::path::Path;
use std::time::Duration;

use rc_proto::PayloadKind;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const ENV_MONITOR_TICK_MS: &str = "RC_MONITOR_TICK_MS";
pub const ENV_IDLE_TIMEOUT_MS: &str = "RC_IDLE_TIMEOUT_MS";

/// Sizing for one mailbox and the pool draining it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Mailbox bound; further payloads are dropped.
    pub capacity: usize,
    pub max_workers: usize,
    /// Pending length above which the monitor adds a worker.
    pub backlog_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub envelopes: PoolConfig,
    /// Shared by request, response and confirmation mailboxes.
    pub key_exchange: PoolConfig,
    /// Shared by friend request and friend response mailboxes.
    pub friends: PoolConfig,
    pub monitor_tick_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            envelopes: PoolConfig {
                capacity: 100,
                max_workers: 5,
                backlog_threshold: 10,
            },
            key_exchange: PoolConfig {
                capacity: 20,
                max_workers: 3,
                backlog_threshold: 5,
            },
            friends: PoolConfig {
                capacity: 20,
                max_workers: 3,
                backlog_threshold: 5,
            },
            monitor_tick_ms: 5_000,
            idle_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RC_*` timer overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, EngineError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MONITOR_TICK_MS) {
            self.monitor_tick_ms = parse_ms(ENV_MONITOR_TICK_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT_MS) {
            self.idle_timeout_ms = parse_ms(ENV_IDLE_TIMEOUT_MS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, pool) in [
            ("envelopes", &self.envelopes),
            ("key_exchange", &self.key_exchange),
            ("friends", &self.friends),
        ] {
            if pool.capacity == 0 {
                return Err(EngineError::Config(format!("{name}: capacity must be at least 1")));
            }
            if pool.max_workers == 0 {
                return Err(EngineError::Config(format!(
                    "{name}: max_workers must be at least 1"
                )));
            }
        }
        if self.monitor_tick_ms == 0 {
            return Err(EngineError::Config("monitor_tick_ms must be positive".into()));
        }
        if self.idle_timeout_ms == 0 {
            return Err(EngineError::Config("idle_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn pool_for(&self, kind: PayloadKind) -> &PoolConfig {
        match kind {
            PayloadKind::Envelope => &self.envelopes,
            PayloadKind::FriendRequest | PayloadKind::FriendResponse => &self.friends,
            PayloadKind::KeyExchangeRequest
            | PayloadKind::KeyExchangeResponse
            | PayloadKind::KeyExchangeConfirmation => &self.key_exchange,
        }
    }

    pub fn monitor_tick(&self) -> Duration {
        Duration::from_millis(self.monitor_tick_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

fn parse_ms(key: &str, raw: &str) -> Result<u64, EngineError> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{key}: expected milliseconds, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_bound_envelopes_higher_than_key_exchange() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_for(PayloadKind::Envelope).max_workers, 5);
        assert_eq!(config.pool_for(PayloadKind::KeyExchangeConfirmation).max_workers, 3);
        assert_eq!(config.pool_for(PayloadKind::FriendResponse).max_workers, 3);
        assert_eq!(config.monitor_tick(), Duration::from_secs(5));
        assert_eq!(config.idle_timeout(), Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn json_file_overrides_subset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{ "idle_timeout_ms": 250, "envelopes": { "capacity": 8, "max_workers": 2, "backlog_threshold": 1 } }"#,
        )
        .unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.idle_timeout_ms, 250);
        assert_eq!(config.envelopes.capacity, 8);
        assert_eq!(config.monitor_tick_ms, 5_000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = EngineConfig::default();
        config.friends.capacity = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let env: HashMap<&str, &str> =
            [(ENV_MONITOR_TICK_MS, "100"), (ENV_IDLE_TIMEOUT_MS, " 40 ")].into();
        let config = EngineConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.monitor_tick_ms, 100);
        assert_eq!(config.idle_timeout_ms, 40);

        let bad = EngineConfig::default().with_overrides(|k| {
            (k == ENV_IDLE_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(matches!(bad, Err(EngineError::Config(_))));
    }
}
