//! Updater configuration file.
//!
//! The configuration lives at `~/.updraft/config.toml` (`%LOCALAPPDATA%\updraft\config.toml` on
//! Windows). The location can be overridden using the `UPDRAFT_CONFIG_PATH` environment variable.
//! A missing file is not an error: every key has a default.
//!
//! ```toml
//! log_level = "info"
//! data_dir = "/var/lib/updraft"
//! temp_root = "/tmp"
//! elevation_command = ["sudo", "-E"]
//! protected_roots = ["/opt", "/usr"]
//! http_timeout_secs = 120
//! user_agent = "acme-updater/1.0"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "UPDRAFT_CONFIG_PATH";

/// Settings shared by every run of the updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Tracing filter used when `RUST_LOG` is unset (e.g. `"info"`, `"updraft_cli=debug"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Root of the long-lived per-product directories used by unattended runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Root under which per-run working directories are created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,

    /// Program and leading arguments used to relaunch with elevated privileges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elevation_command: Vec<String>,

    /// Install roots that require administrator rights; replaces the platform list when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_roots: Option<Vec<PathBuf>>,

    /// Timeout applied to every HTTP request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// User agent sent with HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_http_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("updraft/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            data_dir: None,
            temp_root: None,
            elevation_command: Vec::new(),
            protected_roots: None,
            http_timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl UpdaterConfig {
    /// Load the configuration from the default location.
    ///
    /// Returns the defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// - The default path cannot be determined
    /// - The file exists but cannot be read or contains invalid TOML
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load the configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read updater config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse updater config from {}", path.display()))
    }

    /// Save the configuration to a specific file, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize updater config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write updater config to {}", path.display()))
    }

    /// Path of the configuration file, honouring [`CONFIG_PATH_ENV`].
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("updraft")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".updraft")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Root of the per-product directories, falling back to the platform data directory.
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("updraft")))
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Root of the per-run working directories, falling back to the system temp directory.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default() {
        let config = UpdaterConfig::default();
        assert_eq!(config.http_timeout_secs, 300);
        assert!(config.elevation_command.is_empty());
        assert!(config.user_agent.starts_with("updraft/"));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("nested").join("config.toml");

        let config = UpdaterConfig {
            log_level: Some("debug".to_string()),
            elevation_command: vec!["sudo".to_string(), "-E".to_string()],
            protected_roots: Some(vec![PathBuf::from("/opt")]),
            ..UpdaterConfig::default()
        };

        config.save_to(&config_path).await.unwrap();

        let loaded = UpdaterConfig::load_from(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        tokio::fs::write(&config_path, "http_timeout_secs = 10\n").await.unwrap();

        let loaded = UpdaterConfig::load_from(&config_path).await.unwrap();
        assert_eq!(loaded.http_timeout_secs, 10);
        assert!(loaded.data_dir.is_none());
        assert!(loaded.user_agent.starts_with("updraft/"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        tokio::fs::write(&config_path, "http_timeout_secs = [").await.unwrap();

        let err = UpdaterConfig::load_from(&config_path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse updater config"));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_override_missing_file_yields_default() {
        let temp = TempDir::new().unwrap();
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, temp.path().join("absent.toml"));
        }

        let loaded = UpdaterConfig::load().await.unwrap();
        assert_eq!(loaded, UpdaterConfig::default());

        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
    }
}
