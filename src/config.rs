use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use todoosh_core::SyncOptions;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server URL (e.g., "ws://localhost:8080" or "wss://sync.example.com")
    pub server_url: Option<String>,
    /// Connect and push on every mutating command (default: false)
    #[serde(default)]
    pub auto_sync: bool,
    /// Attempts per remote operation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            auto_sync: false,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncConfig {
    /// Returns true if a server is configured
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some()
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..SyncOptions::default()
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local data file
    pub data_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("TODOOSH_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("TODOOSH_SYNC_URL") {
            sync.server_url = Some(url);
        }

        Ok(Self {
            data_dir,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/todoosh/
    /// - macOS: ~/Library/Application Support/todoosh/
    /// - Windows: %APPDATA%/todoosh/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todoosh")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/todoosh/
    /// - macOS: ~/Library/Application Support/todoosh/
    /// - Windows: %APPDATA%/todoosh/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todoosh")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.ends_with("todoosh"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
        assert!(!config.sync.auto_sync);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.retry_delay_ms, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: /custom/todoosh").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  server_url: ws://localhost:9000").unwrap();
        writeln!(file, "  auto_sync: true").unwrap();
        writeln!(file, "  retry_delay_ms: 250").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/custom/todoosh"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(
            config.sync.server_url.as_deref(),
            Some("ws://localhost:9000")
        );
        assert!(config.sync.auto_sync);
        assert_eq!(config.sync.max_retries, 3);

        let options = config.sync.options();
        assert_eq!(options.retry_delay, Duration::from_millis(250));
        assert_eq!(options.probe_key, "_connection_test");
    }

    #[test]
    fn test_relative_data_dir_resolves_against_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "data_dir: data\n").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("data"));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "data_dir: /from/file\n").unwrap();

        std::env::set_var("TODOOSH_DATA_DIR", "/from/env");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/from/env"));
        assert_eq!(config.data_dir.source, ConfigSource::Environment);

        std::env::remove_var("TODOOSH_DATA_DIR");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
