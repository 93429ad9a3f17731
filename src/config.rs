//! Application configuration
//!
//! Settings are read from a JSON file (`--config PATH`, or `config.json` in the
//! XDG config directory) layered over built-in defaults. Every field is
//! optional in the file.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable overriding the question-provider access token
pub const ACCESS_TOKEN_ENV: &str = "CBTKIT_ACCESS_TOKEN";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid JSON for `AppConfig`
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A value is present but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub proxy: ProxyConfig,
    pub narrator: NarratorConfig,
}

/// Settings for the caching proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Origin the application shell is served from
    pub app_origin: String,
    /// Build identifier; bumping it replaces the shell store wholesale
    pub cache_version: String,
    /// Shell store name prefix, combined with `cache_version`
    pub shell_cache_prefix: String,
    /// Long-lived API store name, independent of `cache_version`
    pub api_cache_name: String,
    /// Maximum age of an API entry before it is revalidated
    pub api_ttl_hours: u64,
    /// Hosts whose requests use the API strategy
    pub api_hosts: Vec<String>,
    /// Shell paths fetched at install
    pub precache_manifest: Vec<String>,
    /// Root document served for offline navigations
    pub navigation_fallback: String,
    /// Host of the question provider used for prewarming
    pub question_host: String,
    /// Static token sent as `AccessToken` to the question provider
    pub access_token: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            app_origin: "http://localhost:5173".to_string(),
            cache_version: "v3".to_string(),
            shell_cache_prefix: "cbt-shell".to_string(),
            api_cache_name: "cbt-api-v1".to_string(),
            api_ttl_hours: 24,
            api_hosts: vec![
                "questions.aloc.com.ng".to_string(),
                "api.dictionaryapi.dev".to_string(),
            ],
            precache_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            navigation_fallback: "/index.html".to_string(),
            question_host: "questions.aloc.com.ng".to_string(),
            access_token: String::new(),
        }
    }
}

impl ProxyConfig {
    /// Name of the shell-asset store for the current version
    pub fn shell_cache_name(&self) -> String {
        format!("{}-{}", self.shell_cache_prefix, self.cache_version)
    }

    pub fn api_ttl_millis(&self) -> i64 {
        (self.api_ttl_hours as i64).saturating_mul(60 * 60 * 1000)
    }

    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.app_origin)
            .map_err(|e| ConfigError::Invalid(format!("app_origin '{}': {}", self.app_origin, e)))
    }
}

/// Settings for read-aloud narration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Speaking rate multiplier (1.0 = engine normal)
    pub rate: f32,
    /// Pitch multiplier, 0.0 to 2.0
    pub pitch: f32,
    /// Volume, 0.0 to 1.0
    pub volume: f32,
    /// Region tags tried in order when choosing an English voice
    pub preferred_regions: Vec<String>,
    /// Synthesizer executable used by the system speech host
    pub program: String,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
            preferred_regions: vec!["NG".to_string(), "GB".to_string()],
            program: "espeak-ng".to_string(),
        }
    }
}

impl AppConfig {
    /// Default config file location (`~/.config/cbtkit/config.json` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cbtkit").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads configuration
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise. The access token from
    /// `CBTKIT_ACCESS_TOKEN` overrides the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            config.proxy.access_token = token;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a config file without applying environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.proxy.origin_url()?;

        if self.proxy.api_ttl_hours == 0 {
            return Err(ConfigError::Invalid("api_ttl_hours must be at least 1".to_string()));
        }
        if self.proxy.api_cache_name == self.proxy.shell_cache_name() {
            return Err(ConfigError::Invalid(
                "api_cache_name must differ from the shell store name".to_string(),
            ));
        }

        let narrator = &self.narrator;
        if !(0.1..=10.0).contains(&narrator.rate) {
            return Err(ConfigError::Invalid(format!("rate {} outside 0.1..=10", narrator.rate)));
        }
        if !(0.0..=2.0).contains(&narrator.pitch) {
            return Err(ConfigError::Invalid(format!("pitch {} outside 0..=2", narrator.pitch)));
        }
        if !(0.0..=1.0).contains(&narrator.volume) {
            return Err(ConfigError::Invalid(format!("volume {} outside 0..=1", narrator.volume)));
        }
        Ok(())
    }
}
