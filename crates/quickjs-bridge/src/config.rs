//! Runtime limits loaded from TOML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use toml::from_str;

use crate::error::{BridgeError, BridgeResult};

/// Default maximum stack size in bytes (256 KiB).
pub const DEFAULT_MAX_STACK_SIZE: usize = 256 * 1024;

/// Resource limits applied to a runtime when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap limit in bytes; `None` leaves the engine unlimited
    pub memory_limit: Option<usize>,
    /// Maximum stack size in bytes; `0` disables the check
    pub max_stack_size: usize,
    /// Allocation threshold in bytes that triggers a GC cycle
    pub gc_threshold: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            gc_threshold: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text is not valid TOML or violates a limit.
    pub fn from_toml_str(contents: &str) -> BridgeResult<Self> {
        let config: Self = from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(
            "Loaded runtime config from {:?}: memory_limit={:?}, max_stack_size={}",
            path,
            config.memory_limit,
            config.max_stack_size
        );
        Ok(config)
    }

    /// Set the heap limit.
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Set the stack limit.
    #[must_use]
    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    /// Check limits that the engine cannot work with.
    ///
    /// # Errors
    /// Returns an error for a zero heap limit.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.memory_limit == Some(0) {
            return Err(BridgeError::Config(
                "memory_limit must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}
