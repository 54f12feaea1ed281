//! Configuration loading and data folder resolution
//!
//! Bootstrap configuration is read once at startup. Sources, highest priority first:
//! 1. Command-line arguments (carried in [`ConfigOverrides`])
//! 2. Environment variable `SURVEY_DATA_FOLDER` (data folder only)
//! 3. TOML config file
//! 4. Built-in defaults
//!
//! A missing TOML file is not an error: defaults apply and [`ServiceConfig::source`] records
//! why, so the caller can report it once logging is up.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable that overrides the data folder
pub const DATA_FOLDER_ENV: &str = "SURVEY_DATA_FOLDER";

/// Bootstrap configuration as written in the TOML file
///
/// Every field is optional in the file; omitted fields take built-in defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: String,

    /// HTTP server port
    pub port: u16,

    /// Folder holding the submission store (optional)
    ///
    /// If not specified: environment → OS default
    pub data_folder: Option<PathBuf>,

    /// Submission store file; relative paths resolve under the data folder
    pub store_path: PathBuf,

    /// Upper bound on a single append, in milliseconds
    pub append_timeout_ms: u64,

    /// Largest accepted request body, in bytes
    pub max_body_bytes: usize,

    /// Allow cross-origin POSTs to the versioned API from any origin
    pub cors_allow_any_origin: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            data_folder: None,
            store_path: default_store_file(),
            append_timeout_ms: default_append_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            cors_allow_any_origin: true,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_store_file() -> PathBuf {
    PathBuf::from("survey.ndjson")
}

fn default_append_timeout_ms() -> u64 {
    5000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub data_folder: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Where the bootstrap values came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this TOML file
    File(PathBuf),
    /// No file at this location; built-in defaults apply
    Missing(PathBuf),
    /// No config location could be determined; built-in defaults apply
    Builtin,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub port: u16,
    pub data_folder: PathBuf,
    /// Absolute (or data-folder-relative resolved) path of the submission store
    pub store_path: PathBuf,
    pub append_timeout: Duration,
    pub max_body_bytes: usize,
    pub cors_allow_any_origin: bool,
    pub logging: LoggingConfig,
    pub source: ConfigSource,
}

impl ServiceConfig {
    /// Load configuration from TOML (if present), environment and CLI overrides
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The TOML file exists but cannot be read or parsed
    /// - A resolved value is out of range (zero timeout, zero body limit)
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let config_path = overrides.config_path.clone().or_else(default_config_path);

        let (toml_config, source) = match config_path {
            Some(path) => match load_toml_config(&path)? {
                Some(toml_config) => (toml_config, ConfigSource::File(path)),
                None => (TomlConfig::default(), ConfigSource::Missing(path)),
            },
            None => (TomlConfig::default(), ConfigSource::Builtin),
        };

        let mut config = Self::resolve(toml_config, overrides)?;
        config.source = source;
        Ok(config)
    }

    /// Merge a parsed TOML config with environment and CLI overrides
    pub fn resolve(toml_config: TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let data_folder = resolve_data_folder(
            overrides.data_folder.as_deref(),
            toml_config.data_folder.as_deref(),
        );

        let store_file = overrides.store_path.unwrap_or(toml_config.store_path);
        if store_file.as_os_str().is_empty() {
            return Err(Error::Config("store_path must not be empty".to_string()));
        }
        let store_path = if store_file.is_absolute() {
            store_file
        } else {
            data_folder.join(store_file)
        };

        if toml_config.append_timeout_ms == 0 {
            return Err(Error::Config("append_timeout_ms must be greater than zero".to_string()));
        }
        if toml_config.max_body_bytes == 0 {
            return Err(Error::Config("max_body_bytes must be greater than zero".to_string()));
        }

        let mut logging = toml_config.logging;
        if let Some(level) = overrides.log_level {
            logging.level = level;
        }

        Ok(Self {
            bind_addr: toml_config.bind_addr,
            port: overrides.port.unwrap_or(toml_config.port),
            data_folder,
            store_path,
            append_timeout: Duration::from_millis(toml_config.append_timeout_ms),
            max_body_bytes: toml_config.max_body_bytes,
            cors_allow_any_origin: toml_config.cors_allow_any_origin,
            logging,
            source: ConfigSource::Builtin,
        })
    }

    /// `host:port` string for the TCP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Read and parse a TOML config file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))?;

    Ok(Some(config))
}

/// Data folder resolution: CLI > `SURVEY_DATA_FOLDER` > TOML > OS default
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    get_default_data_folder()
}

/// Default config file location for the platform
///
/// `~/.config/survey-intake/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("survey-intake").join("config.toml"))
}

/// Get OS-dependent default data folder path
pub fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/survey-intake (or /var/lib/survey-intake for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("survey-intake"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/survey-intake"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("survey-intake"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/survey-intake"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("survey-intake"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\survey-intake"))
    } else {
        PathBuf::from("./survey_data")
    }
}

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}
