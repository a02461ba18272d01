//! Configuration management for qaforge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::{Validate, ValidationError};

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// Dataset generation parameters
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Generative model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Chunk source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Parameters that govern the synthesis pipeline
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_generation"))]
pub struct GenerationConfig {
    /// Number of questions (or contexts, in multi-context mode) to produce
    #[serde(default = "default_number_of_questions")]
    #[validate(range(min = 1))]
    pub number_of_questions: usize,

    /// Minimum usable chunk length in characters
    #[serde(default = "default_chunk_size_threshold")]
    pub chunk_size_threshold: usize,

    /// Neighbours must be strictly more similar than this to join a context
    #[serde(default = "default_similarity_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,

    /// Contexts at or below this length are discarded
    #[serde(default = "default_min_chunks_per_context")]
    pub min_chunks_per_context: usize,

    /// Contexts stop growing at this length
    #[serde(default = "default_max_chunks_per_context")]
    #[validate(range(min = 1))]
    pub max_chunks_per_context: usize,

    /// Build multi-chunk contexts instead of single-chunk questions
    #[serde(default)]
    pub multi_context: bool,

    /// Run the evolution stage
    #[serde(default)]
    pub evolve_queries: bool,

    /// Ordered evolution strategy names
    #[serde(default = "default_evolve_steps")]
    pub evolve_steps: Vec<String>,

    /// Run the answer stage
    #[serde(default = "default_generate_answers")]
    pub generate_answers: bool,

    /// Source allow-list for neighbour retrieval
    #[serde(default)]
    pub sources: Option<Vec<String>>,

    /// Train / validation / test ratio over sources
    #[serde(default = "default_split_ratio")]
    pub split_ratio: [f64; 3],

    /// Seed for every shuffle
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Checkpoint file rewritten after each stage
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,

    /// Neighbours retrieved per context seed
    #[serde(default = "default_neighbor_top_k")]
    #[validate(range(min = 1))]
    pub neighbor_top_k: usize,

    /// Seeds sampled per requested context
    #[serde(default = "default_seed_oversample")]
    #[validate(range(min = 1))]
    pub seed_oversample: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai (any OpenAI-compatible chat completions endpoint)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Backing store for chunks
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceBackend {
    /// Postgres table with a pgvector column
    Postgres,
    /// JSON Lines snapshot loaded into memory
    Jsonl,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_backend")]
    pub backend: SourceBackend,

    /// Database settings (postgres backend)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Chunk table name (postgres backend)
    #[serde(default = "default_chunk_table")]
    pub table: String,

    /// Snapshot file (jsonl backend)
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_number_of_questions() -> usize { 10 }
fn default_chunk_size_threshold() -> usize { 200 }
fn default_similarity_threshold() -> f32 { 0.5 }
fn default_min_chunks_per_context() -> usize { 2 }
fn default_max_chunks_per_context() -> usize { 5 }
fn default_evolve_steps() -> Vec<String> {
    vec!["reasoning_evolution".to_string(), "generalizing_evolution".to_string()]
}
fn default_generate_answers() -> bool { true }
fn default_split_ratio() -> [f64; 3] { [0.6, 0.2, 0.2] }
fn default_seed() -> u64 { 42 }
fn default_neighbor_top_k() -> usize { 10 }
fn default_seed_oversample() -> usize { 5 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_temperature() -> f32 { 0.7 }
fn default_llm_max_tokens() -> usize { 1000 }
fn default_llm_timeout() -> u64 { 60 }
fn default_source_backend() -> SourceBackend { SourceBackend::Postgres }
fn default_chunk_table() -> String { "chunks".to_string() }
fn default_database_url() -> String { "postgres://localhost/qaforge".to_string() }
fn default_max_connections() -> u32 { 5 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "qaforge".to_string() }

/// Cross-field rules that field attributes cannot express
fn validate_generation(config: &GenerationConfig) -> std::result::Result<(), ValidationError> {
    if config.min_chunks_per_context >= config.max_chunks_per_context {
        let mut err = ValidationError::new("context_bounds");
        err.message = Some("min_chunks_per_context must be below max_chunks_per_context".into());
        return Err(err);
    }
    validate_split_ratio(&config.split_ratio)
}

/// A split ratio is three non-negative shares summing to one
pub fn validate_split_ratio(ratio: &[f64; 3]) -> std::result::Result<(), ValidationError> {
    if ratio.iter().any(|r| !r.is_finite() || *r < 0.0) {
        let mut err = ValidationError::new("split_ratio");
        err.message = Some("split ratio entries must be non-negative".into());
        return Err(err);
    }
    let total: f64 = ratio.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        let mut err = ValidationError::new("split_ratio");
        err.message = Some(format!("split ratio must sum to 1, got {}", total).into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__GENERATION__SEED=7
            .add_source(Self::environment())

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("generation.evolve_steps")
            .with_list_parse_key("generation.sources")
            .with_list_parse_key("generation.split_ratio")
    }

    /// Reject configurations the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        self.generation.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            number_of_questions: default_number_of_questions(),
            chunk_size_threshold: default_chunk_size_threshold(),
            similarity_threshold: default_similarity_threshold(),
            min_chunks_per_context: default_min_chunks_per_context(),
            max_chunks_per_context: default_max_chunks_per_context(),
            multi_context: false,
            evolve_queries: false,
            evolve_steps: default_evolve_steps(),
            generate_answers: default_generate_answers(),
            sources: None,
            split_ratio: default_split_ratio(),
            seed: default_seed(),
            checkpoint_path: None,
            neighbor_top_k: default_neighbor_top_k(),
            seed_oversample: default_seed_oversample(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: default_source_backend(),
            database: DatabaseConfig::default(),
            table: default_chunk_table(),
            snapshot_path: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}
