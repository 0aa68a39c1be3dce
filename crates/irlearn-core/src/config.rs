//! # Configuration
//!
//! YAML configuration for irlearn stations. Every section is optional and
//! falls back to the firmware defaults.
//!
//! ## Search path
//!
//! The first existing file wins:
//! 1. `IRLEARN_CONFIG` environment variable
//! 2. `./irlearn.yaml`
//! 3. `<user config dir>/irlearn/config.yaml`
//! 4. `/etc/irlearn/config.yaml`
//!
//! ## Example
//!
//! ```yaml
//! learning:
//!   min_samples: 3
//!   timing_source: last_capture
//! store:
//!   image_path: "/var/lib/irlearn/store.bin"
//! transmit:
//!   hardware_enabled: false
//!   protocol_retry:
//!     max_attempts: 5
//!     backoff_ms: 300
//! logging:
//!   level: debug
//!   format: json
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::image::MAX_IMAGE_SIZE;
use crate::learner::LearningConfig;
use crate::observe::LogConfig;
use crate::transmit::{TransmitConfig, VerifyConfig};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "IRLEARN_CONFIG";

/// Non-volatile storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing file for file-based storage
    pub image_path: PathBuf,
    /// Device size in bytes
    pub device_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from("irlearn-store.bin"),
            device_capacity: MAX_IMAGE_SIZE,
        }
    }
}

/// Complete station configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrConfig {
    pub version: String,
    pub learning: LearningConfig,
    pub store: StoreConfig,
    pub transmit: TransmitConfig,
    pub verify: VerifyConfig,
    pub logging: LogConfig,
}

impl Default for IrConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            learning: LearningConfig::default(),
            store: StoreConfig::default(),
            transmit: TransmitConfig::default(),
            verify: VerifyConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl IrConfig {
    /// Load from the search path, or defaults when no file exists
    pub fn load() -> IrResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        match Self::config_search_paths().iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a specific file
    pub fn load_from(path: &Path) -> IrResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IrError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without validating
    pub fn parse(yaml: &str) -> IrResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| IrError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> IrResult<()> {
        let content = serde_yaml::to_string(self).map_err(|e| IrError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| IrError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./irlearn.yaml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "irlearn") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/irlearn/config.yaml"));
        paths
    }

    pub fn validate(&self) -> IrResult<()> {
        self.learning.validate()?;
        self.transmit.validate()?;
        self.verify.validate()?;
        if self.store.device_capacity < MAX_IMAGE_SIZE {
            return Err(IrError::Config(format!(
                "store.device_capacity {} is smaller than the store image ({} bytes)",
                self.store.device_capacity, MAX_IMAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Defaults rendered as YAML, a starting point for a config file
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::TimingSource;
    use crate::observe::{LogFormat, LogLevel};
    use crate::retry::RetryPolicy;

    #[test]
    fn test_defaults_match_firmware() {
        let config = IrConfig::default();
        assert_eq!(config.learning.max_samples, 20);
        assert_eq!(config.learning.min_samples, 5);
        assert_eq!(config.learning.timeout_ms, 30_000);
        assert_eq!(config.transmit.protocol_retry.max_attempts, 3);
        assert_eq!(config.transmit.raw_retry.max_attempts, 2);
        assert_eq!(config.verify.test_count, 5);
        assert_eq!(config.store.device_capacity, MAX_IMAGE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
learning:
  min_samples: 3
  timing_source: last_capture
transmit:
  hardware_enabled: false
  raw_retry:
    max_attempts: 4
logging:
  level: debug
  format: json
"#;
        let config = IrConfig::parse(yaml).unwrap();
        assert_eq!(config.learning.min_samples, 3);
        assert_eq!(config.learning.max_samples, 20);
        assert_eq!(config.learning.timing_source, TimingSource::LastCapture);
        assert!(!config.transmit.hardware_enabled);
        assert_eq!(config.transmit.raw_retry.max_attempts, 4);
        assert_eq!(config.transmit.raw_retry.backoff_ms, 100);
        assert_eq!(config.transmit.raw_retry.settle_ms, 10);
        assert_eq!(config.transmit.protocol_retry, RetryPolicy::protocol());
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validation() {
        let mut config = IrConfig::default();
        config.learning.min_samples = 0;
        assert!(config.validate().is_err());

        let mut config = IrConfig::default();
        config.transmit.protocol_retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = IrConfig::default();
        config.verify.pass_rate = 120.0;
        assert!(config.validate().is_err());

        let mut config = IrConfig::default();
        config.store.device_capacity = 512;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            IrConfig::parse("learning: [1, 2"),
            Err(IrError::Config(_))
        ));
    }

    #[test]
    fn test_example_yaml_roundtrip() {
        let yaml = IrConfig::example_yaml();
        assert!(yaml.contains("learning:"));
        assert!(yaml.contains("timing_source: winning_group"));
        assert_eq!(IrConfig::parse(&yaml).unwrap(), IrConfig::default());
    }

    #[test]
    fn test_search_paths() {
        let paths = IrConfig::config_search_paths();
        assert!(paths[0].ends_with("irlearn.yaml"));
        assert!(paths.last().unwrap().ends_with("config.yaml"));
    }
}
