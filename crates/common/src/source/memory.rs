//! In-memory chunk store loaded from a JSON Lines snapshot

use super::{cosine_similarity, Chunk, Neighbor, SourceAdapter};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

/// One line of a snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Chunk store held entirely in memory.
///
/// Records keep insertion order, which is also the tie-break order for
/// equally similar neighbours.
#[derive(Debug, Default)]
pub struct InMemorySource {
    records: Vec<SourceRecord>,
    by_id: HashMap<String, usize>,
}

impl InMemorySource {
    pub fn new(records: Vec<SourceRecord>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if by_id.insert(record.id.clone(), idx).is_some() {
                return Err(AppError::Validation {
                    message: format!("duplicate chunk id '{}' in snapshot", record.id),
                    field: Some("id".to_string()),
                });
            }
        }
        Ok(Self { records, by_id })
    }

    /// Load a snapshot with one JSON record per line. Blank lines are skipped.
    pub async fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let records = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<SourceRecord>(line).map_err(|e| AppError::Validation {
                    message: format!("{}:{}: {}", path.display(), n + 1, e),
                    field: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(path = %path.display(), records = records.len(), "Loaded chunk snapshot");
        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SourceAdapter for InMemorySource {
    async fn list_sources(&self) -> Result<BTreeSet<String>> {
        Ok(self.records.iter().map(|r| r.source.clone()).collect())
    }

    async fn chunks_for(&self, sources: &[String]) -> Result<Vec<Chunk>> {
        Ok(self
            .records
            .iter()
            .filter(|r| sources.contains(&r.source))
            .map(|r| Chunk::new(r.id.clone(), r.text.clone()))
            .collect())
    }

    async fn embedding_of(&self, chunk: &Chunk) -> Result<Vec<f32>> {
        self.by_id
            .get(&chunk.id)
            .map(|&idx| self.records[idx].embedding.clone())
            .ok_or_else(|| AppError::InvalidRequest {
                message: format!("chunk '{}' has no stored embedding", chunk.id),
            })
    }

    async fn nearest_neighbors(
        &self,
        embedding: &[f32],
        top_k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<Neighbor>> {
        let mut scored: Vec<(f32, &SourceRecord)> = self
            .records
            .iter()
            .filter(|r| sources.map_or(true, |allowed| allowed.contains(&r.source)))
            .map(|r| (cosine_similarity(embedding, &r.embedding), r))
            .collect();

        // Stable sort keeps snapshot order among ties
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, r)| Neighbor {
                id: r.id.clone(),
                content: r.text.clone(),
                embedding: r.embedding.clone(),
            })
            .collect())
    }
}
