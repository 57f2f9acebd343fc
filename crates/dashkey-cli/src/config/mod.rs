//! Configuration management
//!
//! Settings are layered: built-in defaults, then `settings.json` in the
//! dashkey home directory, then `DASHKEY_*` environment variables (nested
//! keys use `__`, e.g. `DASHKEY_CRYPTO__ALIAS_PREFIX`).

use anyhow::{Context, Result};
use dashkey_core::CryptoConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080/api/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the messaging server, including the API prefix
    pub server_url: String,
    /// Plaintext history database; defaults to `<home>/messages.db`
    pub database_path: Option<PathBuf>,
    pub crypto: CryptoConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            database_path: None,
            crypto: CryptoConfig::default(),
        }
    }
}

impl Settings {
    /// Point at a different messaging server; the URL must be http(s)
    pub fn set_server_url(&mut self, url: &str) -> Result<()> {
        let parsed = reqwest::Url::parse(url.trim())
            .with_context(|| format!("Invalid server URL {:?}", url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Server URL must use http or https, got {:?}", parsed.scheme());
        }
        self.server_url = parsed.as_str().trim_end_matches('/').to_string();
        Ok(())
    }
}

pub struct SettingsManager;

impl SettingsManager {
    /// Get the dashkey home directory (~/.dashkey)
    pub fn dashkey_home() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("DASHKEY_HOME") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".dashkey"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::dashkey_home()?.join("settings.json"))
    }

    /// Directory holding one file per key alias
    pub fn keys_dir() -> Result<PathBuf> {
        Ok(Self::dashkey_home()?.join("keys"))
    }

    pub fn database_path(settings: &Settings) -> Result<PathBuf> {
        match &settings.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::dashkey_home()?.join("messages.db")),
        }
    }

    pub fn load() -> Result<Settings> {
        Self::load_from(&Self::settings_path()?)
    }

    /// Load settings with `path` as the file layer
    pub fn load_from(path: &Path) -> Result<Settings> {
        let layered = ::config::Config::builder()
            .add_source(
                ::config::File::from(path.to_path_buf())
                    .format(::config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix("DASHKEY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read settings from {:?}", path))?;

        let settings: Settings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings from {:?}", path))?;

        settings
            .crypto
            .validate()
            .context("Invalid crypto settings")?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(settings: &Settings) -> Result<()> {
        Self::save_to(&Self::settings_path()?, settings)
    }

    pub fn save_to(path: &Path, settings: &Settings) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;

        // Set permissions on Unix (restrict to owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashkey_core::KeyWrapScheme;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsManager::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.crypto, CryptoConfig::default());
        assert!(settings.database_path.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            server_url: "https://chat.example.com/api".to_string(),
            database_path: Some(dir.path().join("db.sqlite")),
            crypto: CryptoConfig {
                alias_prefix: "Custom_".to_string(),
                wrap_schemes: vec![KeyWrapScheme::EphemeralBox],
            },
        };
        SettingsManager::save_to(&path, &settings).unwrap();

        let loaded = SettingsManager::load_from(&path).unwrap();
        assert_eq!(loaded.server_url, settings.server_url);
        assert_eq!(loaded.database_path, settings.database_path);
        assert_eq!(loaded.crypto.alias_prefix, "Custom_");
    }

    #[test]
    fn test_partial_file_keeps_crypto_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server_url": "http://10.0.0.2:9000"}"#).unwrap();

        let loaded = SettingsManager::load_from(&path).unwrap();
        assert_eq!(loaded.server_url, "http://10.0.0.2:9000");
        assert_eq!(loaded.crypto, CryptoConfig::default());
    }

    #[test]
    fn test_set_server_url_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = SettingsManager::load_from(&path).unwrap();
        settings.set_server_url("https://chat.example.com/api/v1/").unwrap();
        SettingsManager::save_to(&path, &settings).unwrap();

        let loaded = SettingsManager::load_from(&path).unwrap();
        assert_eq!(loaded.server_url, "https://chat.example.com/api/v1");

        assert!(settings.set_server_url("ftp://chat.example.com").is_err());
        assert!(settings.set_server_url("not a url").is_err());
        assert_eq!(settings.server_url, "https://chat.example.com/api/v1");
    }

    #[test]
    fn test_invalid_crypto_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"crypto": {"alias_prefix": ""}}"#).unwrap();
        assert!(SettingsManager::load_from(&path).is_err());
    }
}
