use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, KanifyError};

/// Schema version of the persisted vocabulary. Bumping it forces every
/// installation to download the vocabulary again on the next run.
pub const FORMAT_VERSION: u32 = 2;

/// Name of the state file inside the data directory
pub const STATE_FILE_NAME: &str = "state.json";

fn default_marker_class() -> String {
    "wanikanified".to_string()
}

fn default_max_phrase_tokens() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub substitution: SubstitutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the user API, the key and `/vocabulary/` are appended
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Age in minutes after which the stored vocabulary is downloaded again
    pub max_age_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the state file and logs
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstitutionConfig {
    /// CSS class given to every translation marker
    pub marker_class: String,
    /// Longest phrase (in whitespace-separated tokens) tried first
    pub max_phrase_tokens: usize,
    /// Elements whose text is never rewritten
    pub excluded_tags: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.wanikani.com/api/v1.2/user".to_string(),
            timeout_secs: 30,
            user_agent: format!("wanikanify/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        // one week
        Self { max_age_minutes: 10080 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".wanikanify"),
        }
    }
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            marker_class: default_marker_class(),
            max_phrase_tokens: default_max_phrase_tokens(),
            excluded_tags: vec![
                "script".to_string(),
                "style".to_string(),
                "noscript".to_string(),
                "template".to_string(),
            ],
        }
    }
}

impl StorageConfig {
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("log")
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KanifyError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| KanifyError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KanifyError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| KanifyError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.substitution.max_phrase_tokens == 0 {
            return Err(KanifyError::Config(
                "substitution.max_phrase_tokens must be at least 1".to_string(),
            ));
        }
        if self.refresh.max_age_minutes <= 0 {
            return Err(KanifyError::Config(
                "refresh.max_age_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            "[refresh]\nmax_age_minutes = 60\n",
        ).unwrap();
        assert_eq!(config.refresh.max_age_minutes, 60);
        assert_eq!(config.substitution.max_phrase_tokens, 4);
        assert_eq!(config.substitution.marker_class, "wanikanified");
        assert!(config.api.base_url.ends_with("/api/v1.2/user"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wanikanify.toml");
        let mut config = Config::default();
        config.substitution.max_phrase_tokens = 3;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.substitution.max_phrase_tokens, 3);
        assert_eq!(loaded.storage.state_path(), PathBuf::from(".wanikanify/state.json"));
    }

    #[test]
    fn test_rejects_zero_phrase_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[substitution]\nmax_phrase_tokens = 0\nexcluded_tags = []\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(KanifyError::Config(_))));
    }
}
