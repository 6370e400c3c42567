use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::types::Result;

/// Global configuration for blendctl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Config {
    pub fn default_api_url() -> String {
        "http://localhost:8080".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            token: None,
        }
    }
}

impl Config {
    /// Load configuration from ~/.blend-monitor/config.toml
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Save configuration to ~/.blend-monitor/config.toml
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or("Could not find home directory")?;
        Ok(home.join(".blend-monitor"))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            api_url: "https://monitor.example.com".to_string(),
            token: Some("secret".to_string()),
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "token = \"abc\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url, Config::default_api_url());
        assert_eq!(config.token.as_deref(), Some("abc"));
    }
}
