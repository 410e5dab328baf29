use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::request::Priority;

/// Default upload chunk capacity.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 32 * 1024;

/// Default size of each response piece handed to the sink by the loopback engine.
pub const DEFAULT_RESPONSE_READ_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capacity of the single in-flight buffer used by chunked uploads.
    pub upload_chunk_size: usize,
    /// Priority given to requests that do not set one.
    pub default_priority: Priority,
    pub response_read_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            default_priority: Priority::Medium,
            response_read_size: DEFAULT_RESPONSE_READ_SIZE,
        }
    }
}

impl Config {
    /// Reads `UPLOAD_CHUNK_SIZE` and `REQUEST_PRIORITY` from the environment.
    ///
    /// Values that are missing or do not parse leave the default in place.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(raw) = std::env::var("UPLOAD_CHUNK_SIZE") {
            match raw.parse::<usize>() {
                Ok(size) if size > 0 => cfg.upload_chunk_size = size,
                _ => tracing::warn!(value = %raw, "Ignoring invalid UPLOAD_CHUNK_SIZE"),
            }
        }

        if let Ok(raw) = std::env::var("REQUEST_PRIORITY") {
            match Priority::from_str(&raw) {
                Some(priority) => cfg.default_priority = priority,
                None => tracing::warn!(value = %raw, "Ignoring invalid REQUEST_PRIORITY"),
            }
        }

        cfg
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(yaml).context("Invalid configuration YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.upload_chunk_size > 0, "upload_chunk_size must be positive");
        ensure!(self.response_read_size > 0, "response_read_size must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_fields_default_individually() {
        let cfg = Config::from_yaml_str("upload_chunk_size: 1024\n").unwrap();
        assert_eq!(cfg.upload_chunk_size, 1024);
        assert_eq!(cfg.default_priority, Priority::Medium);
        assert_eq!(cfg.response_read_size, DEFAULT_RESPONSE_READ_SIZE);
    }

    #[test]
    fn yaml_priority_is_lowercase() {
        let cfg = Config::from_yaml_str("default_priority: highest\n").unwrap();
        assert_eq!(cfg.default_priority, Priority::Highest);
    }

    #[test]
    fn yaml_rejects_zero_chunk_size() {
        assert!(Config::from_yaml_str("upload_chunk_size: 0\n").is_err());
    }
}
