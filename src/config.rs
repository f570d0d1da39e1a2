use serde::Deserialize;
use std::collections::HashSet;

use crate::detector::rules::RuleSpec;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectorConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

// ============================================================
// Detection Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_max_velocity")]
    pub max_velocity: usize,
    #[serde(default = "default_velocity_window")]
    pub velocity_window_secs: u64,
    /// Reported through metrics; not used as a branch by the detector.
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,
    #[serde(default = "default_block_threshold")]
    pub block_threshold: f64,
    #[serde(default = "default_true")]
    pub ml_enabled: bool,
    /// Extra rules appended after the built-in ones.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_velocity: 5,
            velocity_window_secs: 3600,
            high_risk_threshold: 0.6,
            block_threshold: 0.8,
            ml_enabled: true,
            rules: Vec::new(),
        }
    }
}

fn default_max_velocity() -> usize {
    5
}

fn default_velocity_window() -> u64 {
    3600
}

fn default_high_risk_threshold() -> f64 {
    0.6
}

fn default_block_threshold() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            host: "0.0.0.0".to_string(),
            max_batch: 1000,
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_batch() -> usize {
    1000
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        let detection = &self.detection;
        for (name, value) in [
            ("high_risk_threshold", detection.high_risk_threshold),
            ("block_threshold", detection.block_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(eyre::eyre!(
                    "detection.{} must be within [0, 1], got {}",
                    name,
                    value
                ));
            }
        }
        if detection.velocity_window_secs == 0 {
            return Err(eyre::eyre!("detection.velocity_window_secs must be positive"));
        }

        let mut seen = HashSet::new();
        for rule in &detection.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(eyre::eyre!("Duplicate rule id '{}'", rule.id));
            }
            if !rule.score.is_finite() || rule.score < 0.0 {
                return Err(eyre::eyre!(
                    "Rule '{}' has invalid score {}",
                    rule.id,
                    rule.score
                ));
            }
        }

        if self.api.max_batch == 0 {
            return Err(eyre::eyre!("api.max_batch must be positive"));
        }
        Ok(())
    }
}
