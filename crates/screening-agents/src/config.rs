use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use coordination::{ConsensusPolicy, DebateConfig, RetryPolicy};
use serde::Deserialize;
use thiserror::Error;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("endpoint url must not be empty")]
    EmptyUrl,

    #[error("endpoint model must not be empty")]
    EmptyModel,

    #[error("rejection threshold {0} is outside 0..=10")]
    ThresholdOutOfRange(f64),

    #[error("accept threshold {0} is outside 0..=10")]
    AcceptOutOfRange(u8),

    #[error("screening concurrency must be at least 1")]
    ZeroConcurrency,
}

/// OpenAI-compatible chat endpoint (Ollama, llama.cpp, vLLM).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Base URL including the `/v1` prefix.
    pub url: String,
    pub model: String,
    /// Bearer token; local servers ignore it.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/v1".into(),
            model: "qwen2.5:7b".into(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.2,
        }
    }
}

/// Debate loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    pub max_rounds: u32,
    pub rejection_threshold: f64,
    pub max_followup_queries: usize,
}

impl Default for DebateSettings {
    fn default() -> Self {
        let debate = DebateConfig::default();
        Self {
            max_rounds: debate.max_rounds,
            rejection_threshold: debate.consensus.rejection_threshold,
            max_followup_queries: debate.max_followup_queries,
        }
    }
}

impl DebateSettings {
    pub fn to_debate_config(&self) -> DebateConfig {
        DebateConfig {
            max_rounds: self.max_rounds,
            consensus: ConsensusPolicy {
                rejection_threshold: self.rejection_threshold,
            },
            max_followup_queries: self.max_followup_queries,
        }
    }
}

/// Batch screening settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Minimum relevance for acceptance.
    pub accept_threshold: u8,
    /// Backfill target when too few documents pass.
    pub min_accepted: usize,
    /// Debate sessions running at once.
    pub screening_concurrency: usize,
    /// Reviewer passes over the literature synthesis; 0 keeps the first draft.
    pub synthesis_rounds: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            accept_threshold: 5,
            min_accepted: 3,
            screening_concurrency: 1,
            synthesis_rounds: 2,
        }
    }
}

/// Character budgets for document text in prompts.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TextLimits {
    pub initial_chars: usize,
    pub review_chars: usize,
    pub viewpoint_chars: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            initial_chars: 30_000,
            review_chars: 10_000,
            viewpoint_chars: 3_000,
        }
    }
}

/// Top-level screening configuration.
///
/// Loaded from an optional TOML file; `SCREEN_*` environment variables
/// override the endpoint and cache path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub endpoint: Endpoint,
    pub retry: RetryPolicy,
    pub debate: DebateSettings,
    pub batch: BatchSettings,
    pub limits: TextLimits,
    /// JSON cache file; `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            retry: RetryPolicy::default(),
            debate: DebateSettings::default(),
            batch: BatchSettings::default(),
            limits: TextLimits::default(),
            cache_path: Some(PathBuf::from("cache/analysis_cache.json")),
        }
    }
}

impl ScreeningConfig {
    /// Load from `path` (defaults when `None`), apply env overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse screening config TOML")
    }

    /// Apply `SCREEN_*` overrides from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCREEN_LLM_URL") {
            self.endpoint.url = url;
        }
        if let Some(model) = lookup("SCREEN_LLM_MODEL") {
            self.endpoint.model = model;
        }
        if let Some(key) = lookup("SCREEN_LLM_API_KEY") {
            self.endpoint.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(path) = lookup("SCREEN_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if self.endpoint.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if !(0.0..=10.0).contains(&self.debate.rejection_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(
                self.debate.rejection_threshold,
            ));
        }
        if self.batch.accept_threshold > 10 {
            return Err(ConfigError::AcceptOutOfRange(self.batch.accept_threshold));
        }
        if self.batch.screening_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// Check if an inference endpoint is reachable (GET {url}/models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
