//! Configuration loading, validation, and management for Mnemo.
//!
//! Loads configuration from `~/.mnemo/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mnemo/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the language model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Language model endpoint
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Where facts, components, and thread contexts live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Turn orchestration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Token budget split
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Memory selection
    #[serde(default)]
    pub compressor: CompressorConfig,

    /// Prompt component learning
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Fact extraction
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Conversation classification
    #[serde(default)]
    pub tracker: TrackerConfig,
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("storage", &self.storage)
            .field("engine", &self.engine)
            .field("budget", &self.budget)
            .field("compressor", &self.compressor)
            .field("registry", &self.registry)
            .field("extractor", &self.extractor)
            .field("tracker", &self.tracker)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on one completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    File,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            "memory" | "in_memory" => Ok(Self::Memory),
            other => Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{other}' (expected sqlite, file, or memory)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file (sqlite) or directory (file). Defaults under `~/.mnemo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(p), _) => p.clone(),
            (None, StorageBackend::File) => AppConfig::config_dir().join("data"),
            (None, _) => AppConfig::config_dir().join("mnemo.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Agent name recorded on extracted facts
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Identity line that opens every system prompt
    #[serde(default = "default_system_prompt")]
    pub base_system_prompt: String,

    /// Total tokens available per turn
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,

    /// Messages kept per thread in the in-process history window
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Reply sent when the language model call fails
    #[serde(default = "default_degraded_reply")]
    pub degraded_reply: String,
}

fn default_agent() -> String {
    "default".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant with long-term memory of the user.".into()
}
fn default_total_tokens() -> usize {
    4000
}
fn default_history_window() -> usize {
    10
}
fn default_degraded_reply() -> String {
    "Sorry, I couldn't reach the language model just now. Please try again in a moment.".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            base_system_prompt: default_system_prompt(),
            total_tokens: default_total_tokens(),
            history_window: default_history_window(),
            degraded_reply: default_degraded_reply(),
        }
    }
}

/// Base fractions and query-length thresholds for the token split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f32,
    #[serde(default = "default_history_fraction")]
    pub history_fraction: f32,
    #[serde(default = "default_system_fraction")]
    pub system_fraction: f32,
    #[serde(default = "default_response_fraction")]
    pub response_fraction: f32,

    /// Floor applied to every bucket when the budget allows it
    #[serde(default = "default_min_bucket")]
    pub min_bucket: usize,

    /// Queries longer than this (words) shift budget toward memory and response
    #[serde(default = "default_long_query_words")]
    pub long_query_words: usize,

    /// Queries shorter than this (words) shift budget toward history
    #[serde(default = "default_short_query_words")]
    pub short_query_words: usize,

    /// Give technical conversations extra memory at the system prompt's expense
    #[serde(default = "default_true")]
    pub technical_shift: bool,

    /// After repeated corrections, move history budget to memory
    #[serde(default = "default_true")]
    pub error_shift: bool,
}

fn default_memory_fraction() -> f32 {
    0.4
}
fn default_history_fraction() -> f32 {
    0.3
}
fn default_system_fraction() -> f32 {
    0.2
}
fn default_response_fraction() -> f32 {
    0.1
}
fn default_min_bucket() -> usize {
    100
}
fn default_long_query_words() -> usize {
    50
}
fn default_short_query_words() -> usize {
    10
}
fn default_true() -> bool {
    true
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            memory_fraction: default_memory_fraction(),
            history_fraction: default_history_fraction(),
            system_fraction: default_system_fraction(),
            response_fraction: default_response_fraction(),
            min_bucket: default_min_bucket(),
            long_query_words: default_long_query_words(),
            short_query_words: default_short_query_words(),
            technical_shift: true,
            error_shift: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressorConfig {
    /// Most-recent facts considered per turn
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,

    /// Answer phrases marking assistant boilerplate rather than user facts
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

fn default_max_facts() -> usize {
    20
}
fn default_denylist() -> Vec<String> {
    [
        "as an ai, i don't have",
        "i don't have the ability",
        "each session is independent",
        "don't have any specific memories",
        "no specific memories saved",
        "don't have memories",
        "no memories saved",
        "as an ai developed by openai",
        "i don't have personal feelings",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_facts: default_max_facts(),
            denylist: default_denylist(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Quality above this counts as a success
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f32,

    /// Smoothing factor for the success-rate moving average
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f32,

    /// Softmax temperature for sampling; lower favours high weights
    #[serde(default = "default_sampling_temperature")]
    pub sampling_temperature: f32,

    /// Fixed RNG seed for reproducible selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Populate the built-in components when storage has none
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

fn default_learning_rate() -> f32 {
    0.1
}
fn default_success_threshold() -> f32 {
    0.6
}
fn default_ema_alpha() -> f32 {
    0.1
}
fn default_sampling_temperature() -> f32 {
    0.5
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            success_threshold: default_success_threshold(),
            ema_alpha: default_ema_alpha(),
            sampling_temperature: default_sampling_temperature(),
            seed: None,
            seed_defaults: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorMode {
    /// Deterministic first-person declaration rules
    #[default]
    Pattern,
    /// Ask the language model for structured JSON
    Llm,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub mode: ExtractorMode,

    /// Model for extraction calls; falls back to `provider.model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Recent messages inspected for classification
    #[serde(default = "default_tracker_window")]
    pub window: usize,

    /// Technical hits needed to call a conversation technical
    #[serde(default = "default_technical_threshold")]
    pub technical_threshold: usize,

    /// Technical hits needed to call the user highly expert
    #[serde(default = "default_high_expertise_threshold")]
    pub high_expertise_threshold: usize,

    /// Queries longer than this (words) are complex tasks
    #[serde(default = "default_long_query_words")]
    pub complex_query_words: usize,
}

fn default_tracker_window() -> usize {
    5
}
fn default_technical_threshold() -> usize {
    2
}
fn default_high_expertise_threshold() -> usize {
    4
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window: default_tracker_window(),
            technical_threshold: default_technical_threshold(),
            high_expertise_threshold: default_high_expertise_threshold(),
            complex_query_words: default_long_query_words(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mnemo/config.toml).
    ///
    /// Environment overrides:
    /// - `MNEMO_API_KEY` then `OPENAI_API_KEY` when no key is configured
    /// - `MNEMO_API_URL`, `MNEMO_MODEL`
    /// - `MNEMO_STORAGE` (sqlite, file, memory)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("MNEMO_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("MNEMO_API_URL") {
            config.provider.api_url = url;
        }

        if let Ok(model) = std::env::var("MNEMO_MODEL") {
            config.provider.model = model;
        }

        if let Ok(backend) = std::env::var("MNEMO_STORAGE") {
            config.storage.backend = backend.parse()?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mnemo")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return invalid("provider.temperature must be between 0.0 and 2.0");
        }

        let b = &self.budget;
        let fractions = [
            b.memory_fraction,
            b.history_fraction,
            b.system_fraction,
            b.response_fraction,
        ];
        if fractions.iter().any(|f| *f < 0.0) {
            return invalid("budget fractions must be non-negative");
        }
        if (fractions.iter().sum::<f32>() - 1.0).abs() > 0.01 {
            return invalid("budget fractions must sum to 1.0");
        }
        if b.short_query_words >= b.long_query_words {
            return invalid("budget.short_query_words must be below long_query_words");
        }

        if self.engine.total_tokens == 0 {
            return invalid("engine.total_tokens must be > 0");
        }

        if self.compressor.max_facts == 0 {
            return invalid("compressor.max_facts must be > 0");
        }

        let r = &self.registry;
        if r.learning_rate < 0.0 {
            return invalid("registry.learning_rate must be non-negative");
        }
        if !(0.0..=1.0).contains(&r.ema_alpha) {
            return invalid("registry.ema_alpha must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&r.success_threshold) {
            return invalid("registry.success_threshold must be between 0.0 and 1.0");
        }
        if r.sampling_temperature <= 0.0 || r.sampling_temperature > 2.0 {
            return invalid("registry.sampling_temperature must be in (0.0, 2.0]");
        }

        if self.tracker.window == 0 {
            return invalid("tracker.window must be > 0");
        }
        if self.tracker.technical_threshold > self.tracker.high_expertise_threshold {
            return invalid("tracker.technical_threshold must not exceed high_expertise_threshold");
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderSettings::default(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            budget: BudgetConfig::default(),
            compressor: CompressorConfig::default(),
            registry: RegistryConfig::default(),
            extractor: ExtractorConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
