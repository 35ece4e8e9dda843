//! Server configuration
//!
//! Layered sources, later ones winning:
//! 1. Built-in defaults
//! 2. Optional file (`--config <path>` or `PORTICO_CONFIG`), format picked by extension
//! 3. Environment variables `PORTICO_<SECTION>__<KEY>`, e.g. `PORTICO_SERVER__PORT=9090`
//!
//! A `.env` file is read by the binary before any of this runs.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use portico_batch::ExecutorOptions;

pub const ENV_PREFIX: &str = "PORTICO";
pub const CONFIG_PATH_VAR: &str = "PORTICO_CONFIG";

const ROTATIONS: &[&str] = &["daily", "hourly", "minutely", "never"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the batch request body, in bytes.
    pub max_request_body_size: usize,
    /// Allowed CORS origins. Empty means no CORS headers.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 10 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchConfig {
    /// Largest accepted batch; unset means unlimited.
    pub max_requests: Option<usize>,
    /// Deadline for an enclosing transaction; unset means none.
    pub transaction_timeout_seconds: Option<u64>,
    /// Mode used when a call omits `enclosingTransaction`.
    pub default_enclosing_transaction: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_requests: Some(200),
            transaction_timeout_seconds: Some(30),
            default_enclosing_transaction: false,
        }
    }
}

impl BatchConfig {
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            max_requests: self.max_requests,
            transaction_timeout: self.transaction_timeout_seconds.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// daily, hourly, minutely or never
    pub file_rotation: String,
    pub opentelemetry_enabled: bool,
    pub otlp_endpoint: String,
    pub otlp_timeout_seconds: u64,
    pub trace_sample_ratio: f64,
    pub service_name: String,
    pub service_version: Option<String>,
    pub deployment_environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "./logs".to_string(),
            file_prefix: "portico".to_string(),
            file_rotation: "daily".to_string(),
            opentelemetry_enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            otlp_timeout_seconds: 10,
            trace_sample_ratio: 1.0,
            service_name: "portico".to_string(),
            service_version: None,
            deployment_environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load from defaults, an optional file and the environment.
    ///
    /// Without an explicit `path`, `PORTICO_CONFIG` names the file if set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = &path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path.as_path()));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".into()));
        }
        if self.server.max_request_body_size == 0 {
            return Err(ConfigError::Invalid(
                "server.max_request_body_size must be greater than 0".into(),
            ));
        }
        if self.batch.max_requests == Some(0) {
            return Err(ConfigError::Invalid(
                "batch.max_requests must be greater than 0 when set".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.logging.trace_sample_ratio) {
            return Err(ConfigError::Invalid(format!(
                "logging.trace_sample_ratio must be within [0, 1], got {}",
                self.logging.trace_sample_ratio
            )));
        }
        if !ROTATIONS.contains(&self.logging.file_rotation.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.file_rotation must be one of {}, got {}",
                ROTATIONS.join(", "),
                self.logging.file_rotation
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid listen address: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        assert_eq!(
            config.batch.executor_options().transaction_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.batch.max_requests = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.trace_sample_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.file_rotation = "weekly".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("portico-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("portico.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9191\n\n[batch]\ndefault_enclosing_transaction = true\nmax_requests = 5"
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.batch.default_enclosing_transaction);
        assert_eq!(config.batch.max_requests, Some(5));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Some(Path::new("/nonexistent/portico.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
