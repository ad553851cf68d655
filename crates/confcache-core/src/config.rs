//! Application configuration management.
//!
//! This module handles loading and saving the remote feed configuration:
//! the base URL, the two document paths, the remote-fetch switch and
//! optional directory overrides.
//!
//! Configuration is stored at `~/.config/confcache/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::Bootstrap;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "confcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_BASE_URL: &str = "CONFCACHE_BASE_URL";
pub const ENV_CACHE_DIR: &str = "CONFCACHE_CACHE_DIR";
pub const ENV_OFFLINE: &str = "CONFCACHE_OFFLINE";

const DEFAULT_BASE_URL: &str = "https://confcache.blob.core.windows.net/main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub content_path: String,
    pub flags_path: String,
    /// Master switch for remote fetching.
    pub enabled: bool,
    pub request_timeout_secs: u64,
    /// Sent as `x-ms-version` when set.
    pub storage_api_version: Option<String>,
    pub cache_dir: Option<PathBuf>,
    /// Directory holding `conference.json` / `featureflags.json` to use
    /// instead of the embedded documents.
    pub bootstrap_dir: Option<PathBuf>,
    /// Start with connectivity marked offline. Not persisted.
    #[serde(skip)]
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            content_path: "conference.json".to_string(),
            flags_path: "featureflags.json".to_string(),
            enabled: true,
            request_timeout_secs: 10,
            storage_api_version: None,
            cache_dir: None,
            bootstrap_dir: None,
            offline: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `CONFCACHE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(ENV_OFFLINE) {
            self.offline = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn content_url(&self) -> String {
        join_url(&self.base_url, &self.content_path)
    }

    pub fn flags_url(&self) -> String {
        join_url(&self.base_url, &self.flags_path)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn bootstrap(&self) -> Bootstrap {
        match self.bootstrap_dir {
            Some(ref dir) => Bootstrap::Directory(dir.clone()),
            None => Bootstrap::Embedded,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_urls_join_base_and_path() {
        let config = Config {
            base_url: "https://cdn.example.test/main/".into(),
            flags_path: "/flags/featureflags.json".into(),
            ..Config::default()
        };
        assert_eq!(
            config.content_url(),
            "https://cdn.example.test/main/conference.json"
        );
        assert_eq!(
            config.flags_url(),
            "https://cdn.example.test/main/flags/featureflags.json"
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.enabled);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"base_url":"https://cdn.example.test","enabled":false}"#,
        )
        .unwrap();

        let mut config = Config::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://cdn.example.test");
        assert!(!config.enabled);
        assert_eq!(config.content_path, "conference.json");

        config.storage_api_version = Some("2021-08-06".into());
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, " https://mirror.example.test "),
            (ENV_CACHE_DIR, "/tmp/confcache-test"),
            (ENV_OFFLINE, "True"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, "https://mirror.example.test");
        assert_eq!(
            config.cache_dir().unwrap(),
            PathBuf::from("/tmp/confcache-test")
        );
        assert!(config.offline);

        config.apply_overrides(|key| (key == ENV_OFFLINE).then(|| "0".to_string()));
        assert!(!config.offline);
        assert_eq!(config.base_url, "https://mirror.example.test");
    }

    #[test]
    fn test_bootstrap_source() {
        assert!(matches!(Config::default().bootstrap(), Bootstrap::Embedded));
        let config = Config {
            bootstrap_dir: Some(PathBuf::from("/opt/confcache")),
            ..Config::default()
        };
        assert!(matches!(config.bootstrap(), Bootstrap::Directory(_)));
    }
}
