//! Tool configuration, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceCatalog;
use crate::reset::RetryBudget;

/// Flash offset where the sketch region starts (bootloader occupies the first 8 KiB).
pub const DEFAULT_READ_OFFSET: u32 = 0x2000;

/// Default flash reader executable name.
pub const DEFAULT_TOOL_NAME: &str = "bossac";

/// Default temporary image location.
pub const DEFAULT_IMAGE_PATH: &str = "./flash.bin";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Product IDs listed as both sketch and bootloader: {0:04X?}")]
    OverlappingPids(Vec<u16>),
}

/// External flash reader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    /// Explicit reader path. Looked up on `PATH` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_path: Option<PathBuf>,
    pub tool_name: String,
    /// Where the flash image is written while it is scanned.
    pub image_path: PathBuf,
    pub read_offset: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            tool_path: None,
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            image_path: PathBuf::from(DEFAULT_IMAGE_PATH),
            read_offset: DEFAULT_READ_OFFSET,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub catalog: DeviceCatalog,
    pub budget: RetryBudget,
    pub flash: FlashConfig,
}

impl RecoveryConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RecoveryConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let overlap = self.catalog.overlapping_pids();
        if !overlap.is_empty() {
            return Err(ConfigError::OverlappingPids(overlap));
        }
        Ok(())
    }
}
