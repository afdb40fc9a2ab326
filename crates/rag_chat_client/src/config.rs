//! Client config load/save for `~/.rag-chat/config.yaml`.
//! Sections: api.* (REST base url), stream.* (endpoint, timeout), title.*.

use std::path::{Path, PathBuf};

/// API section (REST base url).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Stream section (WebSocket endpoint, client timeout).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StreamSection {
    /// ws:// or wss:// base; derived from `api.base_url` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Close the stream after this many milliseconds without a terminal
    /// event. Disabled when absent or zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Title section (auto-generation after the first turn).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TitleSection {
    #[serde(default = "default_true")]
    pub auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for TitleSection {
    fn default() -> Self {
        TitleSection {
            auto: true,
            delay_ms: None,
        }
    }
}

/// Full client config.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub title: TitleSection,
}

impl Config {
    /// REST base url, defaulting to the local backend.
    pub fn api_base_url(&self) -> String {
        self.api
            .base_url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8000".into())
    }

    /// Stream base url: the configured one, or the REST base with its scheme
    /// swapped http→ws / https→wss.
    pub fn stream_url(&self) -> String {
        if let Some(url) = &self.stream.url {
            return url.clone();
        }
        let base = self.api_base_url();
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base
        }
    }
}

/// Returns the default config file path: `~/.rag-chat/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".rag-chat").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
    }
    let contents =
        serde_yaml::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(path, contents).map_err(|e| ConfigError::Io(e.to_string()))
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Parse(String),
}
