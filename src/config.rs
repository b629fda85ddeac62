use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::logging::{self, LogConfig};

/// File name looked up by [`Config::discover`].
pub const CONFIG_FILE_NAME: &str = "hostbind.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Reuse live wrappers for the same native pointer.
    #[serde(default = "default_true")]
    pub cache_wrappers: bool,

    /// Verify instance-of against the target constructor when unwrapping.
    #[serde(default = "default_true")]
    pub check_instance_type: bool,

    /// Turn panics in native callables into host errors.
    #[serde(default = "default_true")]
    pub catch_panics: bool,

    /// Route exceptions thrown by host callbacks invoked from native code
    /// to the host's fatal-exception channel.
    #[serde(default = "default_true")]
    pub fatal_callback_exceptions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub spans: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cache_wrappers: true,
            check_instance_type: true,
            catch_panics: true,
            fatal_callback_exceptions: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            spans: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        LogConfig {
            level: logging::parse_level(&config.level),
            file_output: config.file.is_some(),
            log_path: config.file.clone(),
            json_format: config.json,
            show_spans: config.spans,
            ..LogConfig::default()
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find `hostbind.toml` in the current directory or its parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return config;
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Install the logging subscriber described by `[logging]`
    pub fn init_logging(&self) {
        logging::init_with_config(LogConfig::from(&self.logging));
    }
}
