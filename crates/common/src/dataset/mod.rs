//! Question-answering dataset aggregate
//!
//! Provides:
//! - The shared mutable state every pipeline stage reads and enriches
//! - Union merge semantics
//! - Provenance invariant checks
//! - JSON checkpoint persistence

pub mod export;

use crate::errors::{AppError, Result};
use crate::source::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Mint a fresh query id.
///
/// UUIDv7 ids sort in mint order, so the ordered maps below iterate
/// derived queries in the order they were produced.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Queries, the chunks grounding them, and optional reference answers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Query id to question text
    #[serde(default)]
    pub queries: BTreeMap<String, String>,

    /// Chunk id to chunk text
    #[serde(default)]
    pub corpus: BTreeMap<String, String>,

    /// Query id to the ordered chunk ids that ground it
    #[serde(default)]
    pub relevant_docs: BTreeMap<String, Vec<String>>,

    /// Query id to reference answer, present once answers are generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answers: Option<BTreeMap<String, String>>,
}

/// A broken provenance invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Provenance names a chunk the corpus does not hold
    DanglingChunk { query_id: String, chunk_id: String },
    /// A query has no provenance entry
    MissingProvenance { query_id: String },
    /// A provenance entry has no query
    OrphanProvenance { query_id: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DanglingChunk { query_id, chunk_id } => {
                write!(f, "query {} references chunk {} missing from the corpus", query_id, chunk_id)
            }
            Violation::MissingProvenance { query_id } => {
                write!(f, "query {} has no relevant_docs entry", query_id)
            }
            Violation::OrphanProvenance { query_id } => {
                write!(f, "relevant_docs entry {} has no query", query_id)
            }
        }
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queries
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn add_chunk(&mut self, chunk: &Chunk) {
        self.corpus.insert(chunk.id.clone(), chunk.text.clone());
    }

    /// Insert a query under a freshly minted id and return the id
    pub fn add_query(&mut self, text: impl Into<String>, chunk_ids: Vec<String>) -> String {
        let id = new_id();
        self.insert_query(id.clone(), text, chunk_ids);
        id
    }

    /// Insert or overwrite a query and its provenance
    pub fn insert_query(&mut self, id: String, text: impl Into<String>, chunk_ids: Vec<String>) {
        self.queries.insert(id.clone(), text.into());
        self.relevant_docs.insert(id, chunk_ids);
    }

    /// Remove a query together with its provenance and answer
    pub fn remove_query(&mut self, id: &str) -> Option<(String, Vec<String>)> {
        let text = self.queries.remove(id);
        let docs = self.relevant_docs.remove(id);
        if let Some(answers) = self.expected_answers.as_mut() {
            answers.remove(id);
        }
        text.map(|t| (t, docs.unwrap_or_default()))
    }

    /// Union merge: keys from `other` overwrite existing ones, nothing is removed
    pub fn merge(&mut self, other: Dataset) {
        self.queries.extend(other.queries);
        self.corpus.extend(other.corpus);
        self.relevant_docs.extend(other.relevant_docs);
        if let Some(answers) = other.expected_answers {
            self.expected_answers
                .get_or_insert_with(BTreeMap::new)
                .extend(answers);
        }
    }

    /// The chunks grounding a query, in provenance order
    pub fn grounding_chunks(&self, query_id: &str) -> Result<Vec<Chunk>> {
        let ids = self
            .relevant_docs
            .get(query_id)
            .ok_or_else(|| AppError::Validation {
                message: format!("query {} has no relevant_docs entry", query_id),
                field: Some("relevant_docs".to_string()),
            })?;

        ids.iter()
            .map(|chunk_id| {
                self.corpus
                    .get(chunk_id)
                    .map(|text| Chunk::new(chunk_id.clone(), text.clone()))
                    .ok_or_else(|| AppError::MissingChunk {
                        query_id: query_id.to_string(),
                        chunk_id: chunk_id.clone(),
                    })
            })
            .collect()
    }

    /// Grounding chunk texts joined by single spaces
    pub fn context_text(&self, query_id: &str) -> Result<String> {
        Ok(self
            .grounding_chunks(query_id)?
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(" "))
    }

    pub fn set_answer(&mut self, query_id: String, answer: String) {
        self.expected_answers
            .get_or_insert_with(BTreeMap::new)
            .insert(query_id, answer);
    }

    pub fn answer(&self, query_id: &str) -> Option<&str> {
        self.expected_answers
            .as_ref()
            .and_then(|a| a.get(query_id))
            .map(String::as_str)
    }

    /// Every provenance invariant violation, in query id order
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for query_id in self.queries.keys() {
            if !self.relevant_docs.contains_key(query_id) {
                violations.push(Violation::MissingProvenance {
                    query_id: query_id.clone(),
                });
            }
        }

        for (query_id, chunk_ids) in &self.relevant_docs {
            if !self.queries.contains_key(query_id) {
                violations.push(Violation::OrphanProvenance {
                    query_id: query_id.clone(),
                });
            }
            for chunk_id in chunk_ids {
                if !self.corpus.contains_key(chunk_id) {
                    violations.push(Violation::DanglingChunk {
                        query_id: query_id.clone(),
                        chunk_id: chunk_id.clone(),
                    });
                }
            }
        }

        violations
    }

    /// Write the full dataset to `path`, replacing any previous checkpoint
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(self)?;

        // Atomic replace via a sibling temp file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), queries = self.len(), "Checkpoint written");
        Ok(())
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let dataset: Dataset = serde_json::from_slice(&raw)?;
        info!(
            path = %path.display(),
            queries = dataset.queries.len(),
            chunks = dataset.corpus.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }
}
