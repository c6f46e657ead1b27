// User settings
// Loaded from ~/.config/winegap/settings.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Run config used when a command is given none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_config: Option<PathBuf>,

    /// Lowercase hex SHA-256 of the access key. Unset = open access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_sha256: Option<String>,

    /// Log filter used when RUST_LOG is unset (e.g. "info", "winegap_recon=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("winegap");
        config_dir.join("settings.toml")
    }

    /// Load settings from `path`. A missing file yields the defaults; a
    /// malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        let settings: Settings =
            toml::from_str(&contents).map_err(|e| format!("{}: {e}", path.display()))?;
        settings.validate().map_err(|e| format!("{}: {e}", path.display()))?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(digest) = &self.access_key_sha256 {
            if !matches!(hex::decode(digest), Ok(bytes) if bytes.len() == 32) {
                return Err("access_key_sha256 must be 64 hex characters".to_string());
            }
        }
        Ok(())
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, contents).map_err(|e| e.to_string())
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_config_path_ends_with_app_dir() {
        let path = Settings::config_path();
        assert!(path.ends_with("winegap/settings.toml"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/settings.toml");
        let settings = Settings {
            default_config: Some(PathBuf::from("/data/winegap.toml")),
            access_key_sha256: Some(DIGEST.to_string()),
            log_level: Some("info".to_string()),
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_malformed_digest_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "access_key_sha256 = \"not-a-digest\"\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.contains("64 hex characters"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "password = \"hunter2\"\n").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
