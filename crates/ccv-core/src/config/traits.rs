//! Core configuration trait for the CCV configuration system

use crate::{CcvError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Core trait for CCV configuration types.
///
/// Configuration is plain TOML. Loading always validates, so a value obtained
/// through this trait is ready to hand to the protocol core.
pub trait CcvConfig: Clone + Default + DeserializeOwned + Send + Sync + 'static {
    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Get default configuration values
    fn defaults() -> Self {
        Self::default()
    }

    /// Parse and validate configuration from a TOML string
    fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CcvError::from(e).with_context(format!("failed to read {}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&content)
    }
}
