//! Configuration file support.
//!
//! Settings load from an optional `nudiff.toml`, with the registry base
//! URL overridable through `NUDIFF_REGISTRY_URL` for pointing at mirrors
//! or test fixtures.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default NuGet v3 flat-container endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://api.nuget.org/v3-flatcontainer";

/// nudiff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Flat-container base URL, without a trailing slash.
    pub registry_url: String,

    /// Per-download timeout in seconds.
    pub timeout_secs: u64,

    /// User agent sent to the registry.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            timeout_secs: 60,
            user_agent: format!("nudiff/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file doesn't
    /// exist, then apply environment overrides.
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Config::default()
            })
        } else {
            Config::default()
        };

        if let Ok(url) = std::env::var("NUDIFF_REGISTRY_URL") {
            config.registry_url = url;
        }
        config.registry_url = config.registry_url.trim_end_matches('/').to_string();
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.user_agent.starts_with("nudiff/"));
    }

    #[test]
    fn test_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nudiff.toml");
        std::fs::write(&path, "registry_url = \"https://mirror.example/flat2\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.registry_url, "https://mirror.example/flat2");
        // Unspecified fields keep defaults.
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_default(&tmp.path().join("absent.toml"));
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);
    }
}
