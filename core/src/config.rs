//! Client configuration.
//!
//! `ClientConfig` is assembled once, through [`ClientConfig::builder`] or
//! [`ClientConfig::from_env`], and is read-only afterwards. The API key is the
//! one exception: it is held as an [`ApiKey`] capability that can be rotated
//! in place, and the client reads it again for every request.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::ConfigError;

/// Connect, write and read timeout applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Byte budget of the on-disk response cache (10 MiB).
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

pub const ENV_BASE_URL: &str = "SHOPAPP_BASE_URL";
pub const ENV_API_KEY: &str = "SHOPAPP_API_KEY";
pub const ENV_CACHE_DIR: &str = "SHOPAPP_CACHE_DIR";
pub const ENV_HTTP_LOG: &str = "SHOPAPP_HTTP_LOG";

/// Shared, rotatable bearer credential.
///
/// Clones share the same slot, so rotating through any clone is observed by
/// every client holding one.
#[derive(Clone)]
pub struct ApiKey(Arc<RwLock<String>>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(key.into())))
    }

    /// The key as of now.
    pub fn current(&self) -> String {
        self.0.read().clone()
    }

    /// Replace the key; subsequent requests authenticate with `key`.
    pub fn rotate(&self, key: impl Into<String>) {
        *self.0.write() = key.into();
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        ApiKey::new(key)
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        ApiKey::new(key)
    }
}

/// How much of each exchange the HTTP logger writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HttpLogLevel {
    None,
    /// Request line, response status and latency.
    Basic,
    /// `Basic` plus headers.
    Headers,
    /// `Headers` plus bodies.
    Body,
}

impl Default for HttpLogLevel {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            HttpLogLevel::Body
        } else {
            HttpLogLevel::None
        }
    }
}

impl FromStr for HttpLogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(HttpLogLevel::None),
            "basic" => Ok(HttpLogLevel::Basic),
            "headers" => Ok(HttpLogLevel::Headers),
            "body" => Ok(HttpLogLevel::Body),
            _ => Err(ConfigError::Invalid {
                key: ENV_HTTP_LOG,
                value: s.to_string(),
            }),
        }
    }
}

/// Everything the factory needs to build a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    api_key: ApiKey,
    cache_dir: PathBuf,
    cache_size_bytes: u64,
    timeout: Duration,
    http_log_level: HttpLogLevel,
}

impl ClientConfig {
    pub fn builder(base_url: &str, api_key: impl Into<ApiKey>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_url: base_url.to_string(),
            api_key: api_key.into(),
            cache_dir: None,
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
            timeout: DEFAULT_TIMEOUT,
            http_log_level: HttpLogLevel::default(),
        }
    }

    /// Read the configuration from `SHOPAPP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?;
        let api_key = lookup(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;

        let mut builder = Self::builder(&base_url, api_key);
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            builder = builder.cache_dir(dir);
        }
        if let Some(level) = lookup(ENV_HTTP_LOG) {
            builder = builder.http_log_level(level.parse()?);
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_size_bytes(&self) -> u64 {
        self.cache_size_bytes
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn http_log_level(&self) -> HttpLogLevel {
        self.http_log_level
    }
}

/// Builder for [`ClientConfig`]; unset values fall back to the defaults.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    base_url: String,
    api_key: ApiKey,
    cache_dir: Option<PathBuf>,
    cache_size_bytes: u64,
    timeout: Duration,
    http_log_level: HttpLogLevel,
}

impl ClientConfigBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn cache_size_bytes(mut self, bytes: u64) -> Self {
        self.cache_size_bytes = bytes;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn http_log_level(mut self, level: HttpLogLevel) -> Self {
        self.http_log_level = level;
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Missing(ENV_BASE_URL));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: ENV_BASE_URL,
                value: base_url,
            });
        }
        if self.api_key.current().is_empty() {
            return Err(ConfigError::Missing(ENV_API_KEY));
        }
        if self.cache_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "cache_size_bytes",
                value: "0".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "timeout",
                value: format!("{:?}", self.timeout),
            });
        }

        Ok(ClientConfig {
            base_url,
            api_key: self.api_key,
            cache_dir: self
                .cache_dir
                .unwrap_or_else(|| std::env::temp_dir().join("shopapp-http-cache")),
            cache_size_bytes: self.cache_size_bytes,
            timeout: self.timeout,
            http_log_level: self.http_log_level,
        })
    }
}
