//! Client configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. Durations are stored in milliseconds.
//!
//! # Example
//!
//! ```
//! use c2sim_client::config::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "host": "c2sim.example", "destination": "/topic/C2SIM" }"#).unwrap();
//! assert_eq!(config.host, "c2sim.example");
//! assert_eq!(config.accept_version, "1.2");
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, Result};
use crate::handler::Category;

/// Default subscription destination.
pub const DEFAULT_DESTINATION: &str = "/topic/C2SIM";

/// Default maximum size of a single inbound frame (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default outbound channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Configuration shared by the dispatcher and the session driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Virtual host sent in the CONNECT frame.
    pub host: String,
    /// Optional broker login.
    pub login: Option<String>,
    /// Optional broker passcode.
    pub passcode: Option<String>,
    /// Destination to SUBSCRIBE to.
    pub destination: String,
    /// Subscription id header value.
    pub subscription_id: String,
    /// STOMP versions offered in CONNECT.
    pub accept_version: String,
    /// Bound on waiting for CONNECTED.
    pub connect_timeout_ms: u64,
    /// Bound on each request/response call made by the session driver.
    pub request_timeout_ms: u64,
    /// Bound on queueing an outbound frame.
    pub write_timeout_ms: u64,
    /// Largest inbound frame accepted before it is discarded.
    pub max_frame_size: usize,
    /// Size of each transport read.
    pub read_buffer_size: usize,
    /// Outbound frame channel capacity.
    pub channel_capacity: usize,
    /// Extra selector keywords on top of the built-in table.
    pub selectors: HashMap<String, Category>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            login: None,
            passcode: None,
            destination: DEFAULT_DESTINATION.to_string(),
            subscription_id: "c2sim-0".to_string(),
            accept_version: "1.2".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            write_timeout_ms: 5_000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            selectors: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(ClientError::Config("destination must not be empty".into()));
        }
        if self.max_frame_size == 0 || self.read_buffer_size == 0 || self.channel_capacity == 0 {
            return Err(ClientError::Config(
                "max_frame_size, read_buffer_size and channel_capacity must be non-zero".into(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 || self.write_timeout_ms == 0
        {
            return Err(ClientError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[inline]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
