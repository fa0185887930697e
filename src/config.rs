//! Adapter configuration
//!
//! Each backend has a config struct with defaults, builder-style setters and
//! an environment loader:
//!
//! | Variable                    | Field                        |
//! |-----------------------------|------------------------------|
//! | `PLUGDB_DOCSTORE_URL`       | `DocStoreConfig::url`        |
//! | `PLUGDB_DOCSTORE_DB`        | `DocStoreConfig::db_name`    |
//! | `PLUGDB_TABLESTORE_HOST`    | `TableStoreConfig::host`     |
//! | `PLUGDB_TABLESTORE_PORT`    | `TableStoreConfig::port`     |
//! | `PLUGDB_TABLESTORE_DB`      | `TableStoreConfig::db`       |
//! | `PLUGDB_CONNECT_TIMEOUT_MS` | `connect_timeout` (both)     |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Default time allowed to establish a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_DOCSTORE_URL: &str = "PLUGDB_DOCSTORE_URL";
const ENV_DOCSTORE_DB: &str = "PLUGDB_DOCSTORE_DB";
const ENV_TABLESTORE_HOST: &str = "PLUGDB_TABLESTORE_HOST";
const ENV_TABLESTORE_PORT: &str = "PLUGDB_TABLESTORE_PORT";
const ENV_TABLESTORE_DB: &str = "PLUGDB_TABLESTORE_DB";
const ENV_CONNECT_TIMEOUT_MS: &str = "PLUGDB_CONNECT_TIMEOUT_MS";

/// Document store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStoreConfig {
    /// Server address
    pub url: String,
    /// Database holding the collections
    pub db_name: String,
    /// Bound on connection establishment
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for DocStoreConfig {
    fn default() -> Self {
        Self {
            url: "docstore://localhost:27017".to_string(),
            db_name: "test".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl DocStoreConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Defaults overridden by `PLUGDB_*` environment variables
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_DOCSTORE_URL) {
            config.url = url;
        }
        if let Some(db) = lookup(ENV_DOCSTORE_DB) {
            config.db_name = db;
        }
        if let Some(timeout) = parse_timeout(&lookup)? {
            config.connect_timeout = timeout;
        }
        Ok(config)
    }
}

/// Table store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStoreConfig {
    pub host: String,
    pub port: u16,
    /// Database holding the tables
    pub db: String,
    /// Bound on connection establishment
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for TableStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 28015,
            db: "test".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TableStoreConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the full address with port
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Defaults overridden by `PLUGDB_*` environment variables
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup(ENV_TABLESTORE_HOST) {
            config.host = host;
        }
        if let Some(port) = lookup(ENV_TABLESTORE_PORT) {
            config.port = port.parse().map_err(|_| {
                DbError::invalid_argument(format!("{} is not a port: {}", ENV_TABLESTORE_PORT, port))
            })?;
        }
        if let Some(db) = lookup(ENV_TABLESTORE_DB) {
            config.db = db;
        }
        if let Some(timeout) = parse_timeout(&lookup)? {
            config.connect_timeout = timeout;
        }
        Ok(config)
    }
}

fn parse_timeout(lookup: &impl Fn(&str) -> Option<String>) -> DbResult<Option<Duration>> {
    let Some(raw) = lookup(ENV_CONNECT_TIMEOUT_MS) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| {
            DbError::invalid_argument(format!(
                "{} is not a number of milliseconds: {}",
                ENV_CONNECT_TIMEOUT_MS, raw
            ))
        })
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
