//! JSON file adapter for [`ConfigPort`].
//!
//! The whole [`SystemConfig`] lives in one JSON document.  Missing fields
//! take their defaults, so a file only needs the values it overrides.
//!
//! - Validation: configs are range-checked on load and before every save.
//! - Atomic writes: the document goes to a sibling `.tmp` file that is then
//!   renamed over the target, so a crash never leaves a half-written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::ConfigPort;
use crate::config::SystemConfig;
use crate::error::ConfigError;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, or fall back to defaults when it does not exist.
    pub fn load_or_default(&self) -> Result<SystemConfig, ConfigError> {
        match self.load() {
            Err(ConfigError::NotFound) => {
                info!(
                    "JsonConfigFile: {} not found, using defaults",
                    self.path.display()
                );
                Ok(SystemConfig::default())
            }
            other => other,
        }
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ConfigError::NotFound),
            Err(e) => return Err(ConfigError::Io(e.to_string())),
        };
        let config: SystemConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        config.validate()?;
        info!("JsonConfigFile: loaded {}", self.path.display());
        Ok(config)
    }

    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Corrupted(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ConfigError::Io(e.to_string()))?;
        info!("JsonConfigFile: saved {}", self.path.display());
        Ok(())
    }
}
