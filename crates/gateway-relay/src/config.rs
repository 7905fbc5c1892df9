//! Relay configuration.
//!
//! Settings come from an optional JSON file, then command-line overrides.
//! The credential token is resolved separately through [`TokenSource`] so
//! it never has to live in the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gateway_proto::ClientMetadata;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::gateway::{ClientOptions, DEFAULT_MAX_FRAME_SIZE};

/// Default gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Main relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Gateway WebSocket URL.
    pub gateway_url: String,
    /// Largest inbound message, in bytes.
    pub max_frame_size: usize,
    /// Seconds to wait for the transport to open.
    pub connect_timeout_secs: u64,
    /// Seconds to wait for hello after identify.
    pub hello_timeout_secs: u64,
    /// Identify metadata.
    pub client: ClientMetadata,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_secs: 10,
            hello_timeout_secs: 30,
            client: ClientMetadata::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> Result<Self, RelayError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| RelayError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.gateway_url.is_empty() {
            return Err(RelayError::Config("gateway_url cannot be empty".to_string()));
        }

        if !self.gateway_url.starts_with("ws://") && !self.gateway_url.starts_with("wss://") {
            return Err(RelayError::Config(
                "gateway_url must start with ws:// or wss://".to_string(),
            ));
        }

        if self.max_frame_size == 0 {
            return Err(RelayError::Config(
                "max_frame_size must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(RelayError::Config(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.hello_timeout_secs == 0 {
            return Err(RelayError::Config(
                "hello_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Transport limits for the gateway client.
    #[must_use]
    pub const fn client_options(&self) -> ClientOptions {
        ClientOptions {
            max_frame_size: self.max_frame_size,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            hello_timeout: Duration::from_secs(self.hello_timeout_secs),
        }
    }
}

/// Where the credential token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Token given directly, e.g. on the command line.
    Explicit(String),
    /// File whose trimmed contents are the token.
    File(PathBuf),
}

impl TokenSource {
    /// Resolve the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the token is empty.
    pub fn resolve(&self) -> Result<String, RelayError> {
        let token = match self {
            Self::Explicit(token) => token.trim().to_string(),
            Self::File(path) => std::fs::read_to_string(path)
                .map_err(|e| {
                    RelayError::Config(format!(
                        "failed to read token file '{}': {e}",
                        path.display()
                    ))
                })?
                .trim()
                .to_string(),
        };

        if token.is_empty() {
            return Err(RelayError::Config("token cannot be empty".to_string()));
        }

        Ok(token)
    }
}
