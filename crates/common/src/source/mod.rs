//! Chunk source abstraction
//!
//! A source adapter exposes a pre-chunked, pre-embedded document store:
//! - Source listing (a source is one original document, e.g. a file path)
//! - Chunk retrieval by source
//! - Per-chunk embedding lookup
//! - Nearest-neighbour retrieval, optionally restricted to a source allow-list

mod memory;
mod pgvector;

pub use memory::{InMemorySource, SourceRecord};
pub use pgvector::PgVectorSource;

use crate::config::{SourceBackend, SourceConfig};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Smallest addressable unit of source text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque store identifier
    pub id: String,

    /// Chunk text
    pub text: String,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk returned by nearest-neighbour retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl Neighbor {
    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.id.clone(), self.content.clone())
    }
}

/// Capability interface over a vector store holding chunked documents
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// All distinct source identifiers
    async fn list_sources(&self) -> Result<BTreeSet<String>>;

    /// Every chunk belonging to the given sources
    async fn chunks_for(&self, sources: &[String]) -> Result<Vec<Chunk>>;

    /// Stored embedding of a chunk
    async fn embedding_of(&self, chunk: &Chunk) -> Result<Vec<f32>>;

    /// Up to `top_k` chunks nearest to `embedding`, nearest first
    async fn nearest_neighbors(
        &self,
        embedding: &[f32],
        top_k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<Neighbor>>;
}

/// Cosine similarity between two embeddings. Returns 0.0 for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Create a source adapter based on configuration
pub async fn create_source(config: &SourceConfig) -> Result<Arc<dyn SourceAdapter>> {
    match config.backend {
        SourceBackend::Postgres => {
            let pool = DbPool::new(&config.database).await?;
            pool.ping().await?;
            Ok(Arc::new(PgVectorSource::new(pool, &config.table)?))
        }
        SourceBackend::Jsonl => {
            let path = config.snapshot_path.as_ref().ok_or_else(|| AppError::Configuration {
                message: "source.snapshot_path is required for the jsonl backend".to_string(),
            })?;
            Ok(Arc::new(InMemorySource::from_jsonl(path).await?))
        }
    }
}
