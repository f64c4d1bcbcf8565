use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Pipeline behaviour
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Locations of the persisted stores
    #[serde(default)]
    pub storage: StorageConfig,

    /// Anthropic adapter settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Machine translation engine selection
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MtEngineKind {
    // @engine: Anthropic messages API used as an MT engine
    #[default]
    Anthropic,
    // @engine: No MT pass, the post-editor translates from the source
    Passthrough,
}

/// Post-editor selection
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EditorKind {
    // @editor: Anthropic messages API
    #[default]
    Anthropic,
    // @editor: Keep the MT draft
    Passthrough,
}

impl std::fmt::Display for MtEngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

impl std::str::FromStr for MtEngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(anyhow!("Invalid MT engine: {}", s)),
        }
    }
}

impl std::fmt::Display for EditorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

impl std::str::FromStr for EditorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(anyhow!("Invalid post-editor: {}", s)),
        }
    }
}

/// Pipeline settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Engine for the raw MT pass
    #[serde(default)]
    pub mt_engine: MtEngineKind,

    /// Engine for the post-editing pass
    #[serde(default)]
    pub llm_editor: EditorKind,

    /// Segments per MT call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Enforce glossary renderings
    #[serde(default = "default_true")]
    pub use_glossary: bool,

    /// Reuse and update the translation memory
    #[serde(default = "default_true")]
    pub use_translation_memory: bool,

    /// Replace glossary terms by placeholders before MT
    #[serde(default)]
    pub protect_terms: bool,

    /// Cache raw MT output between runs
    #[serde(default = "default_true")]
    pub use_mt_cache: bool,

    /// Batches processed at the same time
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Retries of a failing batch after the first attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for a single adapter call
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,

    /// Minimum similarity (0.0-1.0) for fuzzy memory reuse; exact only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_threshold: Option<f32>,

    /// Text written in place of failed segments ({batch} and {index} are
    /// substituted); the source text is kept when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_marker: Option<String>,

    /// Neighbouring paragraphs on each side given to the post-editor
    #[serde(default = "default_context_segments")]
    pub context_segments: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mt_engine: MtEngineKind::default(),
            llm_editor: EditorKind::default(),
            batch_size: default_batch_size(),
            use_glossary: true,
            use_translation_memory: true,
            protect_terms: false,
            use_mt_cache: true,
            max_concurrent_batches: default_max_concurrent_batches(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            adapter_timeout_secs: default_adapter_timeout_secs(),
            fuzzy_threshold: None,
            failure_marker: None,
            context_segments: default_context_segments(),
        }
    }
}

/// Store locations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Glossary JSON file
    #[serde(default = "default_glossary_path")]
    pub glossary_path: PathBuf,

    /// Translation memory JSON file
    #[serde(default = "default_memory_path")]
    pub memory_path: PathBuf,

    /// MT cache JSON file
    #[serde(default = "default_mt_cache_path")]
    pub mt_cache_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            glossary_path: default_glossary_path(),
            memory_path: default_memory_path(),
            mt_cache_path: default_mt_cache_path(),
        }
    }
}

/// Anthropic service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnthropicConfig {
    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// API key for the service; ANTHROPIC_API_KEY is used when empty
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service endpoint URL (optional, for self-hosted)
    #[serde(default = "default_anthropic_endpoint")]
    pub endpoint: String,

    /// Maximum tokens generated per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature parameter for text generation (0.0 to 1.0)
    /// Lower values make output more deterministic, higher values more creative
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout in seconds
    #[serde(default = "default_anthropic_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            api_key: String::new(),
            endpoint: default_anthropic_endpoint(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_anthropic_timeout_secs(),
        }
    }
}

impl AnthropicConfig {
    /// API key from the config file, or from `ANTHROPIC_API_KEY`
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_batch_size() -> usize {
    4
}

fn default_max_concurrent_batches() -> usize {
    1
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_adapter_timeout_secs() -> u64 {
    120
}

fn default_context_segments() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_glossary_path() -> PathBuf {
    PathBuf::from("glossary.json")
}

fn default_memory_path() -> PathBuf {
    PathBuf::from("translation_memory.json")
}

fn default_mt_cache_path() -> PathBuf {
    PathBuf::from("mt_cache.json")
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.3
}

fn default_anthropic_timeout_secs() -> u64 {
    90
}

impl Config {
    /// Load the configuration file, or write and return the default one if
    /// the file does not exist yet
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if FileManager::file_exists(path) {
            let content = FileManager::read_to_string(path)?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path));
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        FileManager::write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        crate::language_utils::validate_language_code(&self.source_language)?;
        crate::language_utils::validate_language_code(&self.target_language)?;
        if crate::language_utils::language_codes_match(&self.source_language, &self.target_language) {
            return Err(anyhow!(
                "Source and target language are the same: {} / {}",
                self.source_language,
                self.target_language
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.batch_size == 0 {
            return Err(anyhow!("pipeline.batch_size must be at least 1"));
        }
        if pipeline.max_concurrent_batches == 0 {
            return Err(anyhow!("pipeline.max_concurrent_batches must be at least 1"));
        }
        if pipeline.adapter_timeout_secs == 0 {
            return Err(anyhow!("pipeline.adapter_timeout_secs must be at least 1"));
        }
        if let Some(threshold) = pipeline.fuzzy_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(anyhow!("pipeline.fuzzy_threshold must be between 0.0 and 1.0, got {}", threshold));
            }
        }

        let needs_anthropic =
            pipeline.mt_engine == MtEngineKind::Anthropic || pipeline.llm_editor == EditorKind::Anthropic;
        if needs_anthropic && self.anthropic.resolved_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for Anthropic (anthropic.api_key or ANTHROPIC_API_KEY)"
            ));
        }
        if pipeline.mt_engine == MtEngineKind::Passthrough && pipeline.llm_editor == EditorKind::Passthrough {
            warn!("Both MT engine and post-editor are passthrough: the output will repeat the source text");
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "ru".to_string(),
            target_language: "en".to_string(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            anthropic: AnthropicConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
