use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = ".asr-hotkey.toml";

/// Persisted configuration, one TOML file in the home directory
///
/// Simple values come before the table sections so the file serializes in
/// valid TOML order.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Hotkey string, normalized at startup (named key or single character)
    pub hotkey: String,
    /// Phrases used to bias recognition, applied as provider vocabulary
    pub vocabulary: Vec<String>,
    pub provider: ProviderSection,
    pub audio: AudioConfig,
    /// Free-form provider tuning (threads, beam_size, language, ...)
    pub options: toml::Table,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderSection {
    pub name: String,
    /// Model path or identifier, meaning is provider-specific
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: "f8".to_owned(),
            vocabulary: Vec::new(),
            provider: ProviderSection::default(),
            audio: AudioConfig::default(),
            options: toml::Table::new(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            name: "whisper".to_owned(),
            model_id: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: "~/.asr-hotkey/asr-hotkey.log".to_owned(),
        }
    }
}

impl Config {
    /// Load config from ~/.asr-hotkey.toml, creating a default file first run
    ///
    /// # Errors
    /// Returns error if the file cannot be read, created, or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default()
                .save_to(&config_path)
                .context("failed to create default config")?;
            println!("Created default config at {}", config_path.display());
        }
        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Write the config to an explicit path
    ///
    /// # Errors
    /// Returns error if serialization or the write fails
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(CONFIG_FILE))
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if HOME is not set
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        path.strip_prefix("~/").map_or_else(
            || Ok(PathBuf::from(path)),
            |rest| {
                let home = std::env::var("HOME").context("HOME environment variable not set")?;
                Ok(PathBuf::from(home).join(rest))
            },
        )
    }
}
