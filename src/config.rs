//! Configuration management for altscribe using the prefer crate.
//!
//! Global settings come from the standard `altscribe` config locations.
//! Each input table may also carry a YAML sidecar with per-site options.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{PricingModel, VisionConfig};
use crate::pipeline::AdmissionLimits;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Directory watched for new input tables.
    pub watch_dir: PathBuf,
    /// Directory watch mode writes its outputs to.
    pub output_dir: PathBuf,
    /// User agent for HTTP requests (None = default, "impersonate" = browser).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests in milliseconds.
    pub request_delay_ms: u64,
    pub vision: VisionConfig,
    pub limits: AdmissionLimits,
    pub pricing: PricingModel,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/altscribe/
        let data_dir = dirs::document_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("altscribe");

        Self {
            watch_dir: data_dir.join("watched"),
            output_dir: data_dir.join("output"),
            data_dir,
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 0,
            vision: VisionConfig::default(),
            limits: AdmissionLimits::default(),
            pricing: PricingModel::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            watch_dir: data_dir.join("watched"),
            output_dir: data_dir.join("output"),
            data_dir,
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Ensure the watch and output directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.watch_dir)?;
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub vision: VisionConfig,
    /// Image admission thresholds and URL exclusions.
    #[serde(default)]
    pub admission: AdmissionLimits,
    #[serde(default)]
    pub pricing: PricingModel,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers altscribe config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("altscribe").await {
            Ok(pref_config) => {
                let target: Option<String> = pref_config.get("target").await.ok();
                let user_agent: Option<String> = pref_config.get("user_agent").await.ok();
                let request_timeout: Option<u64> = pref_config.get("request_timeout").await.ok();
                let request_delay_ms: Option<u64> = pref_config.get("request_delay_ms").await.ok();
                let vision: VisionConfig = pref_config.get("vision").await.unwrap_or_default();
                let admission: AdmissionLimits =
                    pref_config.get("admission").await.unwrap_or_default();
                let pricing: PricingModel = pref_config.get("pricing").await.unwrap_or_default();

                Config {
                    target,
                    user_agent,
                    request_timeout,
                    request_delay_ms,
                    vision,
                    admission,
                    pricing,
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            let data_dir = PathBuf::from(path.as_ref());
            settings.watch_dir = data_dir.join("watched");
            settings.output_dir = data_dir.join("output");
            settings.data_dir = data_dir;
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        settings.vision = self.vision.clone();
        settings.limits = self.admission.clone();
        settings.pricing = self.pricing.clone();
    }
}

/// Load settings from configuration (async version).
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Per-input options read from `<input stem>.yaml` beside the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Extra guidance appended to the vision system prompt.
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub max_cost: Option<f64>,
    /// Seconds between page fetches.
    #[serde(default)]
    pub scrape_delay: Option<f64>,
    /// Clear all alt text before running.
    #[serde(default)]
    pub restart: bool,
}

impl ProcessingConfig {
    /// Sidecar location for an input table.
    pub fn sidecar_path(input: &Path) -> PathBuf {
        input.with_extension("yaml")
    }

    /// Load the sidecar for `input`. A missing sidecar yields defaults.
    pub fn for_input(input: &Path) -> Result<Self, ConfigError> {
        let path = Self::sidecar_path(input);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Inter-page delay, ignoring negative or non-finite values.
    pub fn scrape_delay(&self) -> Option<Duration> {
        self.scrape_delay
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Read an instructions file, trimming surrounding whitespace.
pub fn read_instructions(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_with_data_dir() {
        let settings = Settings::with_data_dir(PathBuf::from("/data"));
        assert_eq!(settings.watch_dir, PathBuf::from("/data/watched"));
        assert_eq!(settings.output_dir, PathBuf::from("/data/output"));
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_apply_to_settings() {
        let config = Config {
            target: Some("/srv/alt".to_string()),
            request_delay_ms: Some(250),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);
        assert_eq!(settings.output_dir, PathBuf::from("/srv/alt/output"));
        assert_eq!(settings.request_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_sidecar_missing_is_default() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("site.csv");
        assert_eq!(ProcessingConfig::for_input(&input).unwrap(), ProcessingConfig::default());
    }

    #[test]
    fn test_sidecar_parses_known_keys() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("site.csv");
        fs::write(
            dir.path().join("site.yaml"),
            "instructions: |\n  Mention the product name.\nmax_cost: 2.5\nscrape_delay: 1.5\nrestart: true\n",
        )
        .unwrap();

        let config = ProcessingConfig::for_input(&input).unwrap();
        assert_eq!(config.instructions(), Some("Mention the product name."));
        assert_eq!(config.max_cost, Some(2.5));
        assert_eq!(config.scrape_delay(), Some(Duration::from_millis(1500)));
        assert!(config.restart);
    }

    #[test]
    fn test_sidecar_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bad.csv");
        fs::write(dir.path().join("bad.yaml"), "max_cost: [not, a, number]\n").unwrap();
        assert!(matches!(
            ProcessingConfig::for_input(&input),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
