use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub collections: CollectionSettings,

    #[serde(default)]
    pub icloud: ICloudSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    /// Transport timeout; providers add none of their own
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User agent sent to Reddit
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    "MagicMirror:MMM-Wallpaper:v1.0 (by /u/kolbyhack)".to_string()
}

/// Paths of the bundled image lists
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionSettings {
    #[serde(default = "default_firetv")]
    pub firetv: String,

    #[serde(default = "default_chromecast")]
    pub chromecast: String,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            firetv: default_firetv(),
            chromecast: default_chromecast(),
        }
    }
}

fn default_firetv() -> String {
    "~/.config/wallfetch/firetv.json".to_string()
}
fn default_chromecast() -> String {
    "~/.config/wallfetch/chromecast.json".to_string()
}

/// iCloud shared album settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ICloudSettings {
    #[serde(default = "default_icloud_host")]
    pub default_host: String,

    /// How many 330 host redirects a single webstream call may follow
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

impl Default for ICloudSettings {
    fn default() -> Self {
        Self {
            default_host: default_icloud_host(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_icloud_host() -> String {
    "p04-sharedstreams.icloud.com".to_string()
}
fn default_max_redirects() -> u32 {
    3
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wallfetch");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;

        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be greater than zero");
        }

        if self.icloud.default_host.trim().is_empty() {
            anyhow::bail!("icloud.default_host must not be empty");
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    /// Tilde-expanded path of a collection file
    pub fn collection_path(raw: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(raw).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.icloud.default_host, "p04-sharedstreams.icloud.com");
        assert_eq!(config.icloud.max_redirects, 3);
    }

    #[test]
    fn test_validate_log_level() {
        let config = Config::default();
        assert!(config.validate_log_level("debug").is_ok());
        assert!(config.validate_log_level("warn").is_ok());
        assert!(config.validate_log_level("loud").is_err());
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
[general]
log_level = "debug"

[http]
user_agent = "test-agent"

[icloud]
max_redirects = 5
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.http.user_agent, "test-agent");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.icloud.max_redirects, 5);
        assert_eq!(config.collections.firetv, "~/.config/wallfetch/firetv.json");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\ntimeout_secs = 0").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\nlog_level = \"verbose\"").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_collection_path_keeps_absolute_paths() {
        let path = Config::collection_path("/abs/firetv.json");
        assert_eq!(path, PathBuf::from("/abs/firetv.json"));
    }
}
