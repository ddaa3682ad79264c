use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::cache::DEFAULT_CACHE_DIR;
use crate::core::client::{ReasoningEffort, DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "AAA_SCANNER_MODEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_true")]
    pub show_cost: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_workers() -> usize {
    5
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_true() -> bool {
    true
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            reasoning_effort: ReasoningEffort::default(),
            max_workers: default_max_workers(),
            requests_per_minute: default_requests_per_minute(),
            use_cache: true,
            cache_dir: default_cache_dir(),
            api_base_url: default_base_url(),
            show_cost: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Only consulted when neither `--api-key` nor the environment provide one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub settings: Settings,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("aaa-scanner").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Model name with the environment override applied.
    pub fn model(&self) -> String {
        std::env::var(MODEL_ENV)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.model.clone())
    }

    /// The file key is the lowest-precedence source; the CLI layers
    /// `--api-key` and the environment on top.
    pub fn file_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.settings.model.trim().is_empty() {
            issues.push("model must not be empty".to_string());
        }
        if self.settings.max_workers == 0 {
            issues.push("max_workers must be at least 1".to_string());
        }
        if !self.settings.api_base_url.starts_with("https://") {
            issues.push(format!(
                "Invalid api_base_url: '{}' (must use HTTPS)",
                self.settings.api_base_url
            ));
        }
        if let Some(key) = self.file_api_key() {
            if !key.starts_with("sk-") {
                issues.push("api_key does not look like an OpenAI key (expected 'sk-' prefix)".to_string());
            }
        }
        issues
    }
}
