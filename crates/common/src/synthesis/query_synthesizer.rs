//! Question generation from single chunks or assembled contexts

use super::{ask, prompts, ChunkSampler, Context};
use crate::dataset::Dataset;
use crate::errors::{AppError, Result};
use crate::llm::{strip_code_blocks, GenerativeModel};
use crate::metrics;
use crate::source::Chunk;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct QuerySynthesizer {
    model: Arc<dyn GenerativeModel>,
}

impl QuerySynthesizer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// One question per sampled chunk, each grounded in exactly that chunk.
    ///
    /// Only chunks longer than `chunk_size_threshold` characters are candidates.
    #[instrument(skip(self, sampler, chunks), fields(pool = chunks.len()))]
    pub async fn single_chunk(
        &self,
        sampler: &ChunkSampler,
        n: usize,
        chunks: Vec<Chunk>,
        chunk_size_threshold: usize,
    ) -> Result<Dataset> {
        let candidates: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| c.char_len() > chunk_size_threshold)
            .collect();

        let sampled = sampler.sample(candidates, n).await?;

        let mut dataset = Dataset::new();
        for chunk in &sampled {
            dataset.add_chunk(chunk);
        }

        for chunk in sampled {
            let question = ask(self.model.as_ref(), &prompts::chunk_query(&chunk.text)).await?;
            let query_id = dataset.add_query(question.trim(), vec![chunk.id]);
            debug!(query_id = %query_id, "Single-chunk query generated");
        }

        metrics::record_queries("single_chunk", dataset.len());
        info!(queries = dataset.len(), "Single-chunk synthesis complete");
        Ok(dataset)
    }

    /// One unified question per context, grounded in all of its chunks.
    ///
    /// The reply must be a JSON string; anything else is a malformed reply.
    #[instrument(skip(self, contexts), fields(contexts = contexts.len()))]
    pub async fn multi_context(&self, contexts: &[Context]) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        for chunk in contexts.iter().flatten() {
            dataset.add_chunk(chunk);
        }

        for context in contexts {
            let reply = ask(self.model.as_ref(), &prompts::context_query(context)).await?;
            let question = parse_question(&reply)?;
            let chunk_ids = context.iter().map(|c| c.id.clone()).collect();
            let query_id = dataset.add_query(question, chunk_ids);
            debug!(query_id = %query_id, chunks = context.len(), "Multi-context query generated");
        }

        metrics::record_queries("multi_context", dataset.len());
        info!(queries = dataset.len(), "Multi-context synthesis complete");
        Ok(dataset)
    }
}

fn parse_question(reply: &str) -> Result<String> {
    match serde_json::from_str::<Value>(strip_code_blocks(reply)) {
        Ok(Value::String(question)) => Ok(question.trim().to_string()),
        Ok(other) => Err(AppError::malformed(
            "multi-context query",
            format!("expected a JSON string, got {}", other),
        )),
        Err(e) => Err(AppError::malformed("multi-context query", e.to_string())),
    }
}
