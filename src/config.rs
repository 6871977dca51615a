//! Service configuration, read from TOML.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8000"
//! ip_header = "CF-Connecting-IP"
//! host_headers = ["X-Forwarded-Host", "X-Original-Host"]
//! secret_key_header_name = "X-Secret-Key"
//! secret_key_header_value = "change-me"
//!
//! [logging]
//! access_log = true
//! json = true
//! level = "info"
//!
//! [cache]
//! ttl = 300
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::logging;
use crate::middleware::{RealHostConfig, RealIpConfig, SecretKeyHeaderConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Header carrying the client IP, set by the fronting proxy.
    pub ip_header: Option<String>,
    /// Headers carrying the original host, in order of preference.
    pub host_headers: Vec<String>,
    pub secret_key_header_name: String,
    pub secret_key_header_value: String,
    /// Disables the secret key check. Never enable in production.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_owned(),
            ip_header: None,
            host_headers: Vec::new(),
            secret_key_header_name: String::new(),
            secret_key_header_value: String::new(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub access_log: bool,
    /// Force JSON output; otherwise the format follows the terminal.
    pub json: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { access_log: true, json: false, level: "info".to_owned() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds.
    #[serde(rename = "ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Reads, parses and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.listen.is_empty() {
            return Err(ConfigError::Invalid("server.listen must not be empty".into()));
        }
        if server.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.listen `{}` is not a socket address",
                server.listen
            )));
        }
        if server.secret_key_header_name.is_empty() {
            return Err(ConfigError::MissingSecretHeaderName);
        }
        if server.secret_key_header_value.is_empty() {
            return Err(ConfigError::MissingSecretHeaderValue);
        }
        logging::parse_level(&self.logging.level)?;
        Ok(())
    }

    pub fn real_ip(&self) -> RealIpConfig {
        RealIpConfig { ip_header: self.server.ip_header.clone() }
    }

    pub fn real_host(&self) -> RealHostConfig {
        RealHostConfig { headers: self.server.host_headers.clone() }
    }

    pub fn secret_key(&self) -> SecretKeyHeaderConfig {
        SecretKeyHeaderConfig {
            header_name: self.server.secret_key_header_name.clone(),
            header_value: self.server.secret_key_header_value.clone(),
            debug: self.server.debug,
        }
    }
}
