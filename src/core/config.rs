use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::providers::{Credentials, LocalServerConfig};

fn default_intelligence() -> u8 {
    100
}

/// Persisted client settings: the credential map, the local-server
/// configuration, the 1-100 intelligence preference, and the onboarding
/// flag. Any change to the first three must trigger a strategy rebuild.
#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub local_server: LocalServerConfig,
    #[serde(default = "default_intelligence")]
    pub intelligence: u8,
    #[serde(default)]
    pub onboarded: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::new(),
            local_server: LocalServerConfig::default(),
            intelligence: default_intelligence(),
            onboarded: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Settings, Box<dyn std::error::Error>> {
        Ok(Self::load_from_path(&Self::config_path()?))
    }

    /// Load settings from `path`. A missing or corrupt file yields the
    /// defaults rather than an error; settings must never block startup.
    pub fn load_from_path(path: &Path) -> Settings {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(path = %path.display(), "discarding corrupt settings: {err}");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(&Self::config_path()?)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let contents = toml::to_string_pretty(self)?;
        let temp_file = NamedTempFile::new_in(parent)?;
        fs::write(temp_file.path(), contents)?;
        temp_file.persist(path)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "relais")
            .ok_or("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Clamp the intelligence preference into its 1-100 range.
    pub fn set_intelligence(&mut self, preference: u8) {
        self.intelligence = preference.clamp(1, 100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::Provider;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let settings = Settings::load_from_path(&dir.path().join("config.toml"));

        assert_eq!(settings.intelligence, 100);
        assert!(!settings.onboarded);
        assert!(!settings.credentials.any_present());
        assert!(!settings.local_server.is_configured());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "intelligence = \"not a number").expect("write corrupt file");

        let settings = Settings::load_from_path(&path);
        assert_eq!(settings.intelligence, 100);
    }

    #[test]
    fn settings_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.credentials.set(Provider::OpenRouter, "sk-or-test");
        settings.local_server.base_url = "http://localhost:8080".to_string();
        settings.set_intelligence(20);
        settings.onboarded = true;
        settings.save_to_path(&path).expect("save");

        let reloaded = Settings::load_from_path(&path);
        assert_eq!(reloaded.credentials.get(Provider::OpenRouter), Some("sk-or-test"));
        assert_eq!(reloaded.local_server.base_url, "http://localhost:8080");
        assert_eq!(reloaded.intelligence, 20);
        assert!(reloaded.onboarded);
    }

    #[test]
    fn intelligence_is_clamped_to_its_range() {
        let mut settings = Settings::default();
        settings.set_intelligence(0);
        assert_eq!(settings.intelligence, 1);
        settings.set_intelligence(200);
        assert_eq!(settings.intelligence, 100);
    }
}
