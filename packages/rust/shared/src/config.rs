//! Application configuration for newsmirror.
//!
//! User config lives at `~/.newsmirror/newsmirror.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NewsMirrorError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsmirror.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsmirror";

// ---------------------------------------------------------------------------
// Config structs (matching newsmirror.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Page metadata enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Document store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Reconciliation pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Built-in scheduler settings.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the item API; ranking and item endpoints hang off it.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Prefix for canonical discussion links (`<prefix><id>`).
    #[serde(default = "default_item_link_base")]
    pub item_link_base: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            item_link_base: default_item_link_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://hacker-news.firebaseio.com/v0".into()
}
fn default_item_link_base() -> String {
    "https://news.ycombinator.com/item?id=".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// When false, new items are stored without page metadata.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-request timeout for page and image fetches.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Images with a larger body are not probed.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    /// Pages with a larger body are not scanned for metadata.
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
            max_page_bytes: default_max_page_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_image_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_max_page_bytes() -> u64 {
    2 * 1024 * 1024
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file. A leading `~/` expands to the home dir.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.newsmirror/newsmirror.db".into()
}

impl StorageConfig {
    /// Resolve `db_path`, expanding a leading `~/`.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    NewsMirrorError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.db_path)),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum in-flight item fetches. 1 keeps the fetch loop strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between two rounds of `newsmirror watch`.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    4 * 60 * 60
}

impl AppConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.source.api_base_url).map_err(|e| {
            NewsMirrorError::config(format!(
                "source.api_base_url '{}' is not a valid URL: {e}",
                self.source.api_base_url
            ))
        })?;

        if self.source.timeout_secs == 0 {
            return Err(NewsMirrorError::config("source.timeout_secs must be > 0"));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(NewsMirrorError::config(
                "enrichment.timeout_secs must be > 0",
            ));
        }
        if self.pipeline.concurrency == 0 {
            return Err(NewsMirrorError::config("pipeline.concurrency must be >= 1"));
        }
        if self.schedule.interval_secs == 0 {
            return Err(NewsMirrorError::config("schedule.interval_secs must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsmirror/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewsMirrorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsmirror/newsmirror.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsMirrorError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        NewsMirrorError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsMirrorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsMirrorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsMirrorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
