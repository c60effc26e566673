//! Server configuration.
//!
//! ```toml
//! bind_address = "127.0.0.1"
//! port = 5600
//! view_update_interval = 200
//! search_view_update_interval = 500
//! max_pending_lines = 1024
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Configuration of the API server.
///
/// Fields missing from a configuration file keep their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The address to bind to.
    pub bind_address: String,
    /// The port to listen on. 0 picks a free port.
    pub port: u16,
    /// Flush interval of list views, in milliseconds.
    pub view_update_interval: u64,
    /// Flush interval of search result views, in milliseconds.
    pub search_view_update_interval: u64,
    /// Longest accepted request line in bytes.
    pub max_line_length: usize,
    /// Outgoing lines queued for a client before it is disconnected.
    pub max_pending_lines: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5600,
            view_update_interval: 200,
            search_view_update_interval: 500,
            max_line_length: 1024 * 1024,
            max_pending_lines: 1024,
        }
    }
}

impl ServerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Set the bind address.
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the list view flush interval.
    pub fn view_update_interval(mut self, interval: Duration) -> Self {
        self.view_update_interval = interval.as_millis() as u64;
        self
    }

    /// Set the search view flush interval.
    pub fn search_view_update_interval(mut self, interval: Duration) -> Self {
        self.search_view_update_interval = interval.as_millis() as u64;
        self
    }

    /// Set the longest accepted request line.
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }

    /// Set how far a client may fall behind on outgoing lines.
    pub fn max_pending_lines(mut self, lines: usize) -> Self {
        self.max_pending_lines = lines;
        self
    }

    /// Get the bind address string (address:port).
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn view_interval(&self) -> Duration {
        Duration::from_millis(self.view_update_interval)
    }

    pub fn search_view_interval(&self) -> Duration {
        Duration::from_millis(self.search_view_update_interval)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.view_update_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "view_update_interval",
                message: "must be positive".to_string(),
            });
        }
        if self.search_view_update_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search_view_update_interval",
                message: "must be positive".to_string(),
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_line_length",
                message: "must be positive".to_string(),
            });
        }
        if self.max_pending_lines == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_pending_lines",
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
