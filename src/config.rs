use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{JudgmentError, Result};

/// Main configuration structure loaded from judgment_mind.toml and environment variables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Scheduling limits for the eight-stage pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of independent stages executing at once
    pub worker_pool_size: usize,
    pub stage_timeout_ms: u64,
    /// Confidence recorded for a stage that errored, panicked or timed out
    pub failure_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 3,
            stage_timeout_ms: 5_000,
            failure_confidence: 0.1,
        }
    }
}

/// Which anomaly detector the tracker runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStrategy {
    None,
    Threshold,
    Statistical,
}

impl AnomalyStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "threshold" => Some(Self::Threshold),
            "statistical" | "zscore" => Some(Self::Statistical),
            _ => None,
        }
    }
}

/// Snapshot retention, persistence cadence and analysis caching
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub storage_path: PathBuf,
    /// Only the most recent N snapshots are written to durable storage
    pub max_persisted_snapshots: usize,
    /// Oldest snapshots are dropped from memory past this bound
    pub max_snapshots_in_memory: usize,
    /// Persist after every Nth recorded snapshot
    pub save_every: usize,
    pub analysis_cache_ttl_secs: u64,
    pub analysis_cache_capacity: usize,
    pub anomaly_strategy: AnomalyStrategy,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_persisted_snapshots: 1_000,
            max_snapshots_in_memory: 5_000,
            save_every: 10,
            analysis_cache_ttl_secs: 300,
            analysis_cache_capacity: 64,
            anomaly_strategy: AnomalyStrategy::Threshold,
        }
    }
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("judgment-mind"))
        .unwrap_or_else(|| PathBuf::from("data/cognitive_evolution"))
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "judgment_mind=info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "judgment_mind=info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            evolution: EvolutionConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses JUDGMENT_MIND_CONFIG environment variable or defaults to "judgment_mind.toml"
    pub fn load() -> Result<Self> {
        if let Ok(env_path) = std::env::var("JM_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        let config_path = std::env::var("JUDGMENT_MIND_CONFIG")
            .unwrap_or_else(|_| "judgment_mind.toml".to_string());

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(_) => {
                tracing::warn!("Config file {} not found, using defaults", config_path);
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing sections and keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply JM_* overrides (env-first)
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(size) = env_parse::<usize>("JM_WORKER_POOL_SIZE")? {
            self.pipeline.worker_pool_size = size;
        }
        if let Some(ms) = env_parse::<u64>("JM_STAGE_TIMEOUT_MS")? {
            self.pipeline.stage_timeout_ms = ms;
        }
        if let Ok(path) = std::env::var("JM_STORAGE_PATH") {
            self.evolution.storage_path = PathBuf::from(path);
            tracing::debug!("JM_STORAGE_PATH env override applied");
        }
        if let Some(n) = env_parse::<usize>("JM_SAVE_EVERY")? {
            self.evolution.save_every = n;
        }
        if let Some(n) = env_parse::<usize>("JM_MAX_PERSISTED_SNAPSHOTS")? {
            self.evolution.max_persisted_snapshots = n;
        }
        if let Some(ttl) = env_parse::<u64>("JM_CACHE_TTL_SECS")? {
            self.evolution.analysis_cache_ttl_secs = ttl;
        }
        if let Ok(raw) = std::env::var("JM_ANOMALY_STRATEGY") {
            self.evolution.anomaly_strategy =
                AnomalyStrategy::parse(&raw).ok_or_else(|| JudgmentError::Config {
                    message: format!(
                        "JM_ANOMALY_STRATEGY must be one of none, threshold, statistical (got '{}')",
                        raw
                    ),
                })?;
        }
        Ok(())
    }

    /// Validate the configuration, clamping soft limits
    pub fn validate(&mut self) -> Result<()> {
        if self.evolution.save_every == 0 {
            return Err(JudgmentError::Config {
                message: "save_every must be at least 1".into(),
            });
        }
        if self.evolution.max_persisted_snapshots == 0 {
            return Err(JudgmentError::Config {
                message: "max_persisted_snapshots must be at least 1".into(),
            });
        }
        if self.evolution.max_snapshots_in_memory < self.evolution.max_persisted_snapshots {
            tracing::warn!(
                "max_snapshots_in_memory {} below max_persisted_snapshots {}, raising",
                self.evolution.max_snapshots_in_memory,
                self.evolution.max_persisted_snapshots
            );
            self.evolution.max_snapshots_in_memory = self.evolution.max_persisted_snapshots;
        }
        if !(10..=600_000).contains(&self.pipeline.stage_timeout_ms) {
            let clamped = self.pipeline.stage_timeout_ms.clamp(10, 600_000);
            tracing::warn!(
                "stage_timeout_ms {} out of range, clamping to {}",
                self.pipeline.stage_timeout_ms,
                clamped
            );
            self.pipeline.stage_timeout_ms = clamped;
        }
        if !(0.0..=1.0).contains(&self.pipeline.failure_confidence) {
            return Err(JudgmentError::Config {
                message: "failure_confidence must be between 0.0 and 1.0".into(),
            });
        }
        if self.evolution.analysis_cache_capacity == 0 {
            self.evolution.analysis_cache_capacity = 1;
        }
        if self.pipeline.worker_pool_size == 0 {
            tracing::warn!("worker_pool_size is 0; concurrent runs will fail to schedule");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| JudgmentError::Config {
                message: format!("{} has an invalid value: '{}'", key, raw),
            }),
        Err(_) => Ok(None),
    }
}
