//! Store configuration, loadable from JSON
//!
//! ```
//! use blockstore::{Backend, StoreConfig};
//!
//! let config = StoreConfig::from_json_str(
//!     r#"{"path": "/tmp/blocks", "block_length": 512, "backend": "memory"}"#,
//! )
//! .unwrap();
//! assert_eq!(config.block_length, 512);
//! assert_eq!(config.backend, Backend::Memory);
//! assert_eq!(config.read_timeout(), None);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StoreError;

/// Which `BackingStore` implementation to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Location of the backing resource (ignored by the memory backend)
    pub path: PathBuf,
    pub block_length: u32,
    #[serde(default)]
    pub backend: Backend,
    /// Upper bound on how long `read()` waits for its block; wait forever if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
}

impl StoreConfig {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P, block_length: u32) -> Self {
        Self {
            path: path.into(),
            block_length,
            backend: Backend::default(),
            read_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parse and validate a JSON configuration
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` for malformed JSON and
    /// `StoreError::ZeroBlockLength` for a zero block length.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreError::Config(format!("failed to parse store config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration
    ///
    /// # Errors
    ///
    /// Same as `from_json_str`, plus `StoreError::Config` on read failures.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_reader(reader)
            .map_err(|e| StoreError::Config(format!("failed to read store config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `StoreError::ZeroBlockLength` if `block_length` is zero.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.block_length == 0 {
            return Err(StoreError::ZeroBlockLength);
        }
        Ok(())
    }

    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = StoreConfig::from_json_str(r#"{"path": "blocks.dat", "block_length": 4}"#)
            .unwrap();
        assert_eq!(config, StoreConfig::new("blocks.dat", 4));
        assert_eq!(config.backend, Backend::File);
    }

    #[test]
    fn test_read_timeout_from_json() {
        let config = StoreConfig::from_json_str(
            r#"{"path": "x", "block_length": 4, "backend": "sqlite", "read_timeout_ms": 250}"#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_block_length_rejected() {
        let result = StoreConfig::from_json_str(r#"{"path": "x", "block_length": 0}"#);
        assert!(matches!(result, Err(StoreError::ZeroBlockLength)));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = StoreConfig::from_json_str(r#"{"path": "x""#);
        assert!(matches!(result, Err(StoreError::Config(_))));

        let result = StoreConfig::from_json_str(r#"{"path": "x", "block_length": 4, "backend": "tape"}"#);
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_from_reader_round_trip() {
        let config = StoreConfig::new("blocks.dat", 16)
            .with_backend(Backend::Memory)
            .with_read_timeout(Duration::from_secs(2));
        let json = serde_json::to_vec(&config).unwrap();

        let loaded = StoreConfig::from_reader(json.as_slice()).unwrap();
        assert_eq!(loaded, config);
    }
}
