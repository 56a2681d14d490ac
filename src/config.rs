//! Service configuration
//!
//! Loaded from a TOML file when one is given, then overlaid with the
//! deployment environment (`DATABASE_URL`, `DB_*`, `NATS_URL`). Every
//! section has defaults so an empty file is a valid config.

use crate::error::{AuditLogError, Result};
use crate::provider::nats::NatsConfig;
use crate::types::TopicSubscription;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLogConfig {
    /// Broker the consumers pull from
    pub broker: BrokerKind,
    /// Where log records are persisted
    pub store: StoreKind,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub nats: NatsConfig,
    pub subscriptions: Vec<TopicSubscription>,
    pub consumer: ConsumerConfig,
    pub identity: IdentityConfig,
    pub dead_letter: DeadLetterConfig,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            broker: BrokerKind::Nats,
            store: StoreKind::Postgres,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            nats: NatsConfig::default(),
            subscriptions: vec![TopicSubscription::new("topic-audit", "topic-audit-sub")],
            consumer: ConsumerConfig::default(),
            identity: IdentityConfig::default(),
            dead_letter: DeadLetterConfig::default(),
        }
    }
}

/// Broker backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    #[default]
    Nats,
    /// In-process broker; events only arrive through the same process
    Memory,
}

/// Record store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Postgres,
    /// Records are lost on exit
    Memory,
}

/// HTTP read endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address string (e.g., "0.0.0.0:8082")
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Postgres connection settings
///
/// `url` wins when set; otherwise the discrete fields are used, which
/// avoids percent-encoding passwords into a URL.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            name: "postgres".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("target", &self.describe())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// Postgres connect options for this config
    pub fn connect_options(&self) -> Result<sqlx::postgres::PgConnectOptions> {
        crate::storage::postgres::connect_options_from(self)
    }

    /// Credential-free description for logs
    pub fn describe(&self) -> String {
        match self.url {
            Some(_) => "<database url>".to_string(),
            None => format!("{}:{}/{}", self.host, self.port, self.name),
        }
    }
}

/// Consumer loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Messages processed concurrently per subscription
    pub max_in_flight: usize,

    /// Redelivery delay requested when a write fails transiently (0 = broker default)
    pub retry_delay_secs: u64,

    /// First backoff after a transient transport error
    pub min_backoff_ms: u64,

    /// Backoff cap between re-subscribe attempts
    pub max_backoff_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1,
            retry_delay_secs: 5,
            min_backoff_ms: 500,
            max_backoff_secs: 30,
        }
    }
}

impl ConsumerConfig {
    pub fn retry_delay(&self) -> Option<Duration> {
        (self.retry_delay_secs > 0).then(|| Duration::from_secs(self.retry_delay_secs))
    }

    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs).max(self.min_backoff())
    }
}

/// Identity collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Header carrying the caller token when `Authorization` is absent
    pub header: String,

    /// Static token → subject map (development and tests)
    pub tokens: HashMap<String, String>,

    /// Remote verification endpoint; takes precedence over `tokens`
    pub verify_url: Option<String>,

    pub verify_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            header: "x-identity-token".to_string(),
            tokens: HashMap::new(),
            verify_url: None,
            verify_timeout_secs: 5,
        }
    }
}

/// Dead-letter retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Maximum dead letters kept in memory (0 = unbounded)
    pub capacity: usize,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

impl AuditLogConfig {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AuditLogError::Config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AuditLogError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AuditLogError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            match port.parse() {
                Ok(port) => self.database.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid DB_PORT"),
            }
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = Some(password);
        }
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = name;
        }
        if let Some(url) = lookup("NATS_URL").filter(|v| !v.is_empty()) {
            self.nats.url = url;
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.subscriptions.is_empty() {
            return Err(AuditLogError::Config(
                "At least one subscription must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for binding in &self.subscriptions {
            if binding.topic.trim().is_empty() || binding.subscription.trim().is_empty() {
                return Err(AuditLogError::Config(format!(
                    "Subscription entries need a topic and a name: {}",
                    binding
                )));
            }
            if !seen.insert(binding) {
                return Err(AuditLogError::Config(format!(
                    "Duplicate subscription: {}",
                    binding
                )));
            }
        }

        if self.consumer.max_in_flight == 0 {
            return Err(AuditLogError::Config(
                "consumer.max_in_flight must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}
