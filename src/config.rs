use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Sqlite database URL for the region cache and preferences.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// URL of the regions directory document.
    #[serde(default = "default_regions_url")]
    pub regions_url: String,
    /// API key sent to the regional transit data servers.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Hours between forced region refreshes.
    #[serde(default = "default_region_refresh_hours")]
    pub region_refresh_hours: u64,
    /// Minutes past "now" to include in arrival queries.
    #[serde(default = "default_arrivals_window_minutes")]
    pub arrivals_window_minutes: u32,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite://busboard.db?mode=rwc".to_string()
}

fn default_regions_url() -> String {
    "https://regions.onebusaway.org/regions-v3.json".to_string()
}

fn default_api_key() -> String {
    "TEST".to_string()
}

fn default_region_refresh_hours() -> u64 {
    24
}

fn default_arrivals_window_minutes() -> u32 {
    65
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
