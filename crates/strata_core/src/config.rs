//! Configuration for the streaming cache layer
//!
//! The cache is tuned through a small TOML document. Every field has a default,
//! so an empty document (or no document at all) yields a working configuration.
//!
//! ```toml
//! refresh_every = 100
//! heartbeat_ms = 1000
//! channel_capacity = 256
//! event_capacity = 256
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of committed items between two progress notifications.
pub const DEFAULT_REFRESH_EVERY: usize = 100;

/// Fallback progress cadence for slow streams.
pub const DEFAULT_HEARTBEAT_MS: u64 = 1000;

/// Capacity of the item and error channels handed to a streaming query.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the broadcast channel carrying progress and status events.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tuning knobs for stores and their fetch tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Emit a progress event every `refresh_every` committed items
    pub refresh_every: usize,

    /// Emit a progress event at least this often while a fetch is running
    pub heartbeat_ms: u64,

    /// Bound of the item/error channels between a query and its source
    pub channel_capacity: usize,

    /// Bound of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_every: DEFAULT_REFRESH_EVERY,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn with_refresh_every(mut self, refresh_every: usize) -> Self {
        self.refresh_every = refresh_every;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat_ms = heartbeat.as_millis() as u64;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No cache config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::TomlSerialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("refresh_every", self.refresh_every as u64),
            ("heartbeat_ms", self.heartbeat_ms),
            ("channel_capacity", self.channel_capacity as u64),
            ("event_capacity", self.event_capacity as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CacheConfig::from_toml_str("").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.heartbeat(), Duration::from_millis(DEFAULT_HEARTBEAT_MS));
    }

    #[test]
    fn test_partial_document_overrides_fields() {
        let config = CacheConfig::from_toml_str("refresh_every = 7\nheartbeat_ms = 50\n").unwrap();
        assert_eq!(config.refresh_every, 7);
        assert_eq!(config.heartbeat(), Duration::from_millis(50));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = CacheConfig::from_toml_str("channel_capacity = 0").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                field: "channel_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            }
        );
    }

    #[test]
    fn test_load_missing_file_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");
        assert_eq!(CacheConfig::load(&path).unwrap(), CacheConfig::default());

        let config = CacheConfig::default().with_refresh_every(3);
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(CacheConfig::load(&path).unwrap(), config);
    }
}
