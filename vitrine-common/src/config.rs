//! Bootstrap configuration loading
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap** (this module): data directory, database path, cache
//!    directory, backend endpoint, logging, and the slot cycle table. Static;
//!    the kiosk must restart to pick up changes.
//! 2. **Database runtime settings**: timers, capacities, and the persisted
//!    terminal identity (see `vitrine-kiosk::config`).
//!
//! Missing TOML files never prevent startup: a warning is logged and
//! compiled defaults are used.

use crate::models::SlotKind;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VITRINE_CONFIG";

/// Bootstrap configuration as written in `config.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Directory for the database and media cache
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// SQLite database file (defaults to `<data_dir>/vitrine.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Media cache directory (defaults to `<data_dir>/media`)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Backend base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// API key sent with every backend request
    #[serde(default)]
    pub backend_api_key: Option<String>,

    /// Local status endpoint port
    #[serde(default = "default_status_port")]
    pub status_port: u16,

    /// Feed used by dynamic slots whose content carries no URL
    #[serde(default)]
    pub default_feed_url: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Deploy-time override of the slot cycle table
    #[serde(default)]
    pub slot_cycle: Vec<SlotCycleEntry>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
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

/// One `[[slot_cycle]]` entry
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SlotCycleEntry {
    pub kind: SlotKind,
    pub duration_seconds: u32,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_status_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_path: None,
            cache_dir: None,
            backend_url: default_backend_url(),
            backend_api_key: None,
            status_port: default_status_port(),
            default_feed_url: None,
            logging: LoggingConfig::default(),
            slot_cycle: Vec::new(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load the config file if one can be located, compiled defaults otherwise.
    ///
    /// A file that exists but fails to parse is an error; a missing file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match locate_config_file(explicit) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                warn!("No configuration file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Platform defaults used when neither CLI nor TOML provide a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_dir = if cfg!(target_os = "linux") {
            dirs::data_local_dir()
                .map(|d| d.join("vitrine"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/vitrine"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("vitrine"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vitrine"))
        } else {
            dirs::data_dir()
                .map(|d| d.join("vitrine"))
                .unwrap_or_else(|| PathBuf::from("./vitrine_data"))
        };

        Self {
            data_dir,
            log_level: default_log_level(),
        }
    }
}

/// Locate the config file.
///
/// Priority: explicit path, `VITRINE_CONFIG`, user config dir, `/etc/vitrine`.
/// An explicit path is returned even if missing so the caller reports it.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("vitrine").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/vitrine/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Fully resolved bootstrap configuration
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub cache_dir: PathBuf,
    pub backend_url: String,
    pub backend_api_key: Option<String>,
    pub status_port: u16,
    pub default_feed_url: Option<String>,
    pub logging: LoggingConfig,
    pub slot_cycle: Vec<SlotCycleEntry>,
}

impl BootstrapConfig {
    /// Fill unset paths from the data directory.
    ///
    /// `data_dir_override` (CLI) wins over the TOML value, which wins over the
    /// platform default.
    pub fn resolve(toml: TomlConfig, data_dir_override: Option<PathBuf>) -> Self {
        let data_dir = data_dir_override
            .or(toml.data_dir)
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().data_dir);

        Self {
            database_path: toml
                .database_path
                .unwrap_or_else(|| data_dir.join("vitrine.db")),
            cache_dir: toml.cache_dir.unwrap_or_else(|| data_dir.join("media")),
            data_dir,
            backend_url: toml.backend_url.trim_end_matches('/').to_string(),
            backend_api_key: toml.backend_api_key,
            status_port: toml.status_port,
            default_feed_url: toml.default_feed_url,
            logging: toml.logging,
            slot_cycle: toml.slot_cycle,
        }
    }

    /// Create the data and cache directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
