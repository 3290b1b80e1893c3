//! Pipeline configuration
//!
//! Model name, request timeout, per-call sampling settings and the anomaly
//! threshold.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/scanwise/config/scanwise.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/scanwise.toml");

/// A kind of model call, each with its own sampling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Receipt text to JSON
    Parse,
    /// Spending advice
    Advise,
    /// Document summary
    Summarize,
    /// Code analysis
    CodeReview,
    /// Programming language detection
    DetectLanguage,
}

impl StageKind {
    /// Get the config key for this stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Advise => "advise",
            Self::Summarize => "summarize",
            Self::CodeReview => "code_review",
            Self::DetectLanguage => "detect_language",
        }
    }

    pub fn all() -> &'static [StageKind] {
        &[
            Self::Parse,
            Self::Advise,
            Self::Summarize,
            Self::CodeReview,
            Self::DetectLanguage,
        ]
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.as_str() == key)
    }

    /// Built-in settings used when the config omits a stage
    pub fn default_settings(&self) -> StageSettings {
        match self {
            Self::Parse => StageSettings::new(0.2, 1500),
            Self::Advise => StageSettings::new(0.7, 1000),
            Self::Summarize => StageSettings::new(0.6, 500),
            Self::CodeReview => StageSettings::new(0.5, 1500),
            Self::DetectLanguage => StageSettings::new(0.3, 50),
        }
    }
}

/// Sampling settings for one kind of model call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StageSettings {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Default model name
    pub model: String,
    /// Per-request timeout for model calls
    pub timeout_secs: u64,
    /// Anomaly threshold in percent
    pub threshold_pct: f64,
    stages: HashMap<StageKind, StageSettings>,
    config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        parse_config(DEFAULT_CONFIG).unwrap_or_else(|_| Self::builtin())
    }
}

impl Config {
    /// Load config from the default override location or the embedded defaults
    pub fn load() -> Result<Self> {
        let path = default_config_path();
        let mut config = load_config(path.as_deref())?;
        config.config_path = path.filter(|p| p.exists());
        Ok(config)
    }

    /// Load config from an explicit path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = parse_config(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    fn builtin() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 60,
            threshold_pct: 30.0,
            stages: StageKind::all()
                .iter()
                .map(|k| (*k, k.default_settings()))
                .collect(),
            config_path: None,
        }
    }

    /// Sampling settings for a stage
    pub fn settings(&self, kind: StageKind) -> StageSettings {
        self.stages
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_settings())
    }

    /// Override the settings for a stage
    pub fn set_settings(&mut self, kind: StageKind, settings: StageSettings) {
        self.stages.insert(kind, settings);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Override file the config was read from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("scanwise").join("config").join("scanwise.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<Config> {
    let content = match override_path {
        Some(path) if path.exists() => fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    llm: Option<RawLlm>,
    stages: Option<HashMap<String, RawStage>>,
    anomaly: Option<RawAnomaly>,
}

#[derive(Debug, Deserialize)]
struct RawLlm {
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawStage {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawAnomaly {
    threshold_pct: Option<f64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::builtin();

    if let Some(llm) = raw.llm {
        if let Some(model) = llm.model {
            config.model = model;
        }
        if let Some(timeout) = llm.timeout_secs {
            if timeout == 0 {
                return Err(Error::Config("timeout_secs must be greater than 0".into()));
            }
            config.timeout_secs = timeout;
        }
    }

    if let Some(stages) = raw.stages {
        for (name, stage) in stages {
            let Some(kind) = StageKind::from_key(&name) else {
                tracing::warn!(stage = %name, "Ignoring unknown stage in config");
                continue;
            };
            let defaults = kind.default_settings();
            config.stages.insert(
                kind,
                StageSettings {
                    temperature: stage.temperature.unwrap_or(defaults.temperature),
                    max_tokens: stage.max_tokens.unwrap_or(defaults.max_tokens),
                },
            );
        }
    }

    if let Some(anomaly) = raw.anomaly {
        if let Some(threshold) = anomaly.threshold_pct {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(Error::Config(format!(
                    "threshold_pct must be a non-negative number, got {}",
                    threshold
                )));
            }
            config.threshold_pct = threshold;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!((config.threshold_pct - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.settings(StageKind::Parse), StageSettings::new(0.2, 1500));
        assert_eq!(config.settings(StageKind::Advise), StageSettings::new(0.7, 1000));
        assert_eq!(
            config.settings(StageKind::DetectLanguage),
            StageSettings::new(0.3, 50)
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [stages.advise]
            max_tokens = 400

            [anomaly]
            threshold_pct = 50.0
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.settings(StageKind::Advise), StageSettings::new(0.7, 400));
        assert_eq!(config.settings(StageKind::Summarize), StageSettings::new(0.6, 500));
        assert!((config.threshold_pct - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_stage_ignored() {
        let config = Config::from_toml("[stages.translate]\ntemperature = 1.0\n").unwrap();
        assert_eq!(config.settings(StageKind::Parse), StageSettings::new(0.2, 1500));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml("[llm]\ntimeout_secs = 0\n").is_err());
        assert!(Config::from_toml("[anomaly]\nthreshold_pct = -5.0\n").is_err());
        assert!(Config::from_toml("not toml at all [").is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanwise.toml");
        fs::write(&path, "[llm]\nmodel = \"gpt-4o-mini\"\ntimeout_secs = 15\n").unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.config_path(), Some(path.as_path()));
    }

    #[test]
    fn test_stage_kind_as_str() {
        assert_eq!(StageKind::CodeReview.as_str(), "code_review");
        assert_eq!(StageKind::from_key("detect_language"), Some(StageKind::DetectLanguage));
        assert_eq!(StageKind::from_key("vision"), None);
    }
}
