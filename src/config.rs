//! Settings.
//!
//! Defaults are overlaid with `QUADGATE_`-prefixed environment variables,
//! using `__` to reach nested keys:
//!
//! ```text
//! QUADGATE_DIRECT_NAMING=true
//! QUADGATE_QUERY__MAX_TIMEOUT_MS=60000
//! QUADGATE_SERVER__PORT=3030
//! ```

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::error::{QuadgateError, Result};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Treat a request URL with no matching endpoint as a graph IRI.
    #[serde(default)]
    pub direct_naming: bool,
    /// Accept `request=` for updates and upgrade GSP endpoints to quads
    /// when no graph is named.
    #[serde(default = "default_true")]
    pub legacy_compatibility: bool,
    /// Used to build absolute request URLs when no `Host` header is sent.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QuerySettings {
    pub default_timeout_ms: Option<u64>,
    /// Upper bound for a client supplied `timeout`.
    pub max_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct UploadSettings {
    /// Parse into a scratch store first even when the store can roll back.
    pub always_buffer: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3030".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            direct_naming: false,
            legacy_compatibility: true,
            base_url: default_base_url(),
            query: QuerySettings::default(),
            upload: UploadSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { default_timeout_ms: None, max_timeout_ms: 300_000 }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 3030 }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(
                Environment::with_prefix("QUADGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(QuadgateError::Config(format!(
                "base_url '{}' is not an absolute URL",
                self.base_url
            )));
        }
        if self.query.max_timeout_ms == 0 {
            return Err(QuadgateError::Config("query.max_timeout_ms must be positive".into()));
        }
        if let Some(default) = self.query.default_timeout_ms {
            if default > self.query.max_timeout_ms {
                return Err(QuadgateError::Config(format!(
                    "query.default_timeout_ms ({default}) exceeds query.max_timeout_ms ({})",
                    self.query.max_timeout_ms
                )));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
