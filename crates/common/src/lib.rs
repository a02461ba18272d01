//! qaforge Common Library
//!
//! Shared code for the qaforge dataset generator including:
//! - Chunk source adapters (pgvector, in-memory snapshot)
//! - Generative model client abstraction
//! - The dataset aggregate and its checkpoint format
//! - The context assembly and query synthesis pipeline
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod dataset;
pub mod db;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod source;
pub mod synthesis;

// Re-export commonly used types
pub use config::AppConfig;
pub use dataset::Dataset;
pub use errors::{AppError, Result};
pub use llm::GenerativeModel;
pub use source::{Chunk, SourceAdapter};
pub use synthesis::DatasetGenerator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
