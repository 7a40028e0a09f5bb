//! Application configuration for Localvore.
//!
//! User config lives at `~/.localvore/localvore.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LocalvoreError, Result};
use crate::types::SiteTags;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "localvore.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".localvore";

// ---------------------------------------------------------------------------
// Config structs (matching localvore.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Seasonal food guide settings.
    #[serde(default)]
    pub seasonal: SeasonalConfig,

    /// Recipe scraping policies.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Ingredient vectorization settings.
    #[serde(default)]
    pub vectorizer: VectorizerConfig,

    /// Recipe1M ETL settings.
    #[serde(default)]
    pub etl: EtlConfig,

    /// Menu API server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// User-defined site tag maps (override built-in presets by name).
    #[serde(default)]
    pub sites: Vec<SiteTags>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the recipe database. `~` expands to the home directory.
    #[serde(default = "default_database")]
    pub database: String,

    /// U.S. state used when none is given.
    #[serde(default = "default_state")]
    pub state: String,

    /// Collections queried by `recommend` and the menu API.
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Number of recipes returned by `recommend`.
    #[serde(default = "default_n_recipes")]
    pub n_recipes: usize,

    /// Directory raw recipe pages are saved under.
    #[serde(default = "default_html_dir")]
    pub html_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            state: default_state(),
            collections: default_collections(),
            n_recipes: default_n_recipes(),
            html_dir: default_html_dir(),
        }
    }
}

fn default_database() -> String {
    "~/.localvore/localvore.db".into()
}
fn default_state() -> String {
    "tennessee".into()
}
fn default_collections() -> Vec<String> {
    vec!["BB".into()]
}
fn default_n_recipes() -> usize {
    5
}
fn default_html_dir() -> String {
    "~/.localvore/pages".into()
}

/// `[seasonal]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalConfig {
    /// Root of the seasonal food guide.
    #[serde(default = "default_seasonal_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_seasonal_timeout")]
    pub timeout_secs: u64,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            base_url: default_seasonal_url(),
            timeout_secs: default_seasonal_timeout(),
        }
    }
}

fn default_seasonal_url() -> String {
    "http://www.seasonalfoodguide.org".into()
}
fn default_seasonal_timeout() -> u64 {
    10
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Maximum concurrent recipe page requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum ms slept before each request.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Hard cap on index pages visited, regardless of site pagination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit(),
            timeout_secs: default_scrape_timeout(),
            max_pages: None,
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    200
}
fn default_scrape_timeout() -> u64 {
    30
}

/// `[vectorizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Word-vector text file (GloVe / word2vec text format). Hashing fallback when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,

    /// Dimension of the hashing fallback.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            dimension: default_dimension(),
        }
    }
}

fn default_dimension() -> usize {
    300
}

/// `[etl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// URL or path of the ingredient-detection predictions.
    #[serde(default = "default_predictions_url")]
    pub predictions_url: String,

    /// Collection Recipe1M documents are written to.
    #[serde(default = "default_etl_collection")]
    pub collection: String,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            predictions_url: default_predictions_url(),
            collection: default_etl_collection(),
        }
    }
}

fn default_predictions_url() -> String {
    "http://data.csail.mit.edu/im2recipe/det_ingrs.json".into()
}
fn default_etl_collection() -> String {
    "recipe1M".into()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the menu API binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".into()
}

// ---------------------------------------------------------------------------
// Scrape policy (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime scrape configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct ScrapePolicy {
    /// Maximum concurrent HTTP requests.
    pub concurrency: u32,
    /// Delay in ms before each request.
    pub rate_limit_ms: u64,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Cap on index pages visited.
    pub max_pages: Option<u32>,
    /// Directory raw pages are saved under.
    pub html_dir: PathBuf,
}

impl From<&AppConfig> for ScrapePolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.scrape.concurrency.max(1),
            rate_limit_ms: config.scrape.rate_limit_ms,
            timeout_secs: config.scrape.timeout_secs,
            max_pages: config.scrape.max_pages,
            html_dir: expand_home(&config.defaults.html_dir),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.localvore/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LocalvoreError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.localvore/localvore.toml`).
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

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LocalvoreError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LocalvoreError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LocalvoreError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LocalvoreError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LocalvoreError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs that cannot work at runtime.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    url::Url::parse(&config.seasonal.base_url).map_err(|e| {
        LocalvoreError::config(format!(
            "seasonal.base_url '{}' is not a URL: {e}",
            config.seasonal.base_url
        ))
    })?;

    if config.defaults.n_recipes == 0 {
        return Err(LocalvoreError::config("defaults.n_recipes must be at least 1"));
    }
    if config.vectorizer.dimension == 0 {
        return Err(LocalvoreError::config("vectorizer.dimension must be at least 1"));
    }

    for site in &config.sites {
        url::Url::parse(&site.root_url).map_err(|e| {
            LocalvoreError::config(format!(
                "site '{}' has an invalid root_url '{}': {e}",
                site.name, site.root_url
            ))
        })?;
        if !site.index_path.contains("{page}") {
            return Err(LocalvoreError::config(format!(
                "site '{}' index_path must contain {{page}}",
                site.name
            )));
        }
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
