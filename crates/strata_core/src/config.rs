//! # Allocator Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! label = "terrain-vertices"
//! elements_per_block = 4
//! initial_blocks = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Construction parameters for a [`BlockAllocator`](crate::BlockAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Name used in log output.
    pub label: String,
    /// Elements per block. Must be non-zero.
    pub elements_per_block: usize,
    /// Blocks reserved up front. Zero starts with an empty store.
    pub initial_blocks: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            label: "strata".to_owned(),
            elements_per_block: 4,
            initial_blocks: 64,
        }
    }
}

impl AllocatorConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// errors of [`AllocatorConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks that the values describe a constructible allocator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero granularity or an initial
    /// capacity whose element count overflows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.elements_per_block == 0 {
            return Err(ConfigError::Invalid(
                "elements_per_block must be greater than zero".to_owned(),
            ));
        }
        if self.initial_blocks.checked_mul(self.elements_per_block).is_none() {
            return Err(ConfigError::Invalid(format!(
                "initial_blocks {} overflows at {} elements per block",
                self.initial_blocks, self.elements_per_block
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = AllocatorConfig::from_toml_str(
            r#"
            label = "terrain"
            elements_per_block = 3
            initial_blocks = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.label, "terrain");
        assert_eq!(config.elements_per_block, 3);
        assert_eq!(config.initial_blocks, 100);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = AllocatorConfig::from_toml_str("initial_blocks = 8").unwrap();
        assert_eq!(config.elements_per_block, AllocatorConfig::default().elements_per_block);
        assert_eq!(config.initial_blocks, 8);
    }

    #[test]
    fn test_zero_granularity_rejected() {
        let err = AllocatorConfig::from_toml_str("elements_per_block = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_overflowing_capacity_rejected() {
        let config = AllocatorConfig {
            elements_per_block: 2,
            initial_blocks: usize::MAX,
            ..AllocatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = AllocatorConfig::from_toml_str("elements_per_block = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AllocatorConfig::load("/nonexistent/strata.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
