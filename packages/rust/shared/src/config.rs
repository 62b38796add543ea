//! Application configuration for ExpoFinder.
//!
//! User config lives at `~/.expofinder/expofinder.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file, only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExpoFinderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "expofinder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".expofinder";

// ---------------------------------------------------------------------------
// Config structs (matching expofinder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub places: PlacesConfig,

    #[serde(default)]
    pub geocoding: GeocodingConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub cooldown: CooldownConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file (`~` is expanded).
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.expofinder/expofinder.db".into()
}

/// `[fetch]` section: venue website retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent sent to venue websites.
    #[serde(default = "default_fetch_user_agent")]
    pub user_agent: String,

    /// Hard ceiling on sanitized content handed to the extractor.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Per-request timeout.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_fetch_user_agent(),
            max_content_chars: default_max_content_chars(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_fetch_user_agent() -> String {
    "Mozilla/5.0 (compatible; ExpoFinderBot/1.0)".into()
}
fn default_max_content_chars() -> usize {
    32_000
}
fn default_fetch_timeout() -> u64 {
    30
}

/// `[llm]` section: OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Name of the env var that may override `base_url`. Its value may be a
    /// bare host root; `/v1` is appended when missing.
    #[serde(default = "default_llm_base_url_env")]
    pub base_url_env: String,

    /// API base URL; requests go to `{base_url}/chat/completions`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_api_key_env(),
            base_url_env: default_llm_base_url_env(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the environment.
    pub fn api_key(&self) -> Result<String> {
        read_secret(&self.api_key_env)
            .ok_or_else(|| ExpoFinderError::credential_missing("LLM", &self.api_key_env))
    }

    /// The base URL, with the environment override applied.
    pub fn resolved_base_url(&self) -> String {
        match read_secret(&self.base_url_env) {
            Some(url) => api_root(&url),
            None => self.base_url.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `https://host` and `https://host/v1/` both become `https://host/v1`.
fn api_root(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_base_url_env() -> String {
    "OPENAI_BASE_URL".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4o".into()
}
fn default_llm_temperature() -> f32 {
    0.1
}
fn default_llm_max_tokens() -> u32 {
    2000
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[places]` section: Google Places text search + details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    #[serde(default = "default_places_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_places_base_url")]
    pub base_url: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Category queries, searched in order.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryQuery>,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_places_api_key_env(),
            base_url: default_places_base_url(),
            timeout_secs: default_provider_timeout(),
            categories: default_categories(),
        }
    }
}

impl PlacesConfig {
    /// Resolve the API key, or `None` when it is unset or blank.
    pub fn api_key(&self) -> Option<String> {
        read_secret(&self.api_key_env)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[[places.categories]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryQuery {
    /// Places type keyword, e.g. `museum`.
    pub category: String,
    /// Maximum number of search results kept.
    pub limit: usize,
}

fn default_places_api_key_env() -> String {
    "GOOGLE_MAPS_API_KEY".into()
}
fn default_places_base_url() -> String {
    "https://maps.googleapis.com/maps/api/place".into()
}
fn default_provider_timeout() -> u64 {
    15
}
fn default_categories() -> Vec<CategoryQuery> {
    vec![
        CategoryQuery {
            category: "museum".into(),
            limit: 5,
        },
        CategoryQuery {
            category: "art_gallery".into(),
            limit: 10,
        },
    ]
}

/// `[geocoding]` section.
///
/// The Google backend is used when the places API key is set,
/// otherwise Nominatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_google_geocode_url")]
    pub google_base_url: String,

    #[serde(default = "default_nominatim_url")]
    pub nominatim_base_url: String,

    #[serde(default = "default_geocoding_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            google_base_url: default_google_geocode_url(),
            nominatim_base_url: default_nominatim_url(),
            user_agent: default_geocoding_user_agent(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_google_geocode_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode".into()
}
fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_geocoding_user_agent() -> String {
    "ExpoFinderEurope/1.0".into()
}

/// `[pacing]` section: minimum interval between calls per provider.
/// Zero disables pacing for that provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Between consecutive venue indexings (target website + LLM).
    #[serde(default = "default_index_interval")]
    pub index_interval_ms: u64,

    #[serde(default = "default_places_interval")]
    pub places_interval_ms: u64,

    /// Nominatim's usage policy allows one request per second.
    #[serde(default = "default_geocoding_interval")]
    pub geocoding_interval_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            index_interval_ms: default_index_interval(),
            places_interval_ms: default_places_interval(),
            geocoding_interval_ms: default_geocoding_interval(),
        }
    }
}

fn default_index_interval() -> u64 {
    2000
}
fn default_places_interval() -> u64 {
    200
}
fn default_geocoding_interval() -> u64 {
    1000
}

/// `[cooldown]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Minimum hours between index runs for the same city.
    #[serde(default = "default_cooldown_hours")]
    pub hours: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            hours: default_cooldown_hours(),
        }
    }
}

fn default_cooldown_hours() -> u32 {
    24
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.expofinder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ExpoFinderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.expofinder/expofinder.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ExpoFinderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ExpoFinderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ExpoFinderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ExpoFinderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ExpoFinderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ExpoFinderError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read an env var, treating blank values as unset.
fn read_secret(var_name: &str) -> Option<String> {
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
