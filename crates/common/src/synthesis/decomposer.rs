//! Compound query detection and decomposition
//!
//! Detection is a literal substring test: "and " followed by one of the
//! configured question words, case-sensitive. A flagged query is removed
//! before its parts are added back, so a query whose decomposition yields no
//! multi-chunk part is dropped.

use super::{ask, prompts};
use crate::dataset::Dataset;
use crate::errors::{AppError, Result};
use crate::llm::{strip_code_blocks, GenerativeModel};
use crate::metrics;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const STAGE: &str = "decomposition";

/// Default question words that mark a compound query after "and "
pub const QUESTION_WORDS: [&str; 7] = ["what", "how", "why", "when", "where", "who", "which"];

/// Outcome counts of one decomposition pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecompositionReport {
    /// Queries flagged and removed
    pub flagged: usize,
    /// Sub-questions added back
    pub retained: usize,
    /// Sub-questions dropped for needing a single chunk
    pub dropped: usize,
}

pub struct QueryDecomposer {
    model: Arc<dyn GenerativeModel>,
    markers: Vec<String>,
}

impl QueryDecomposer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self::with_question_words(model, &QUESTION_WORDS)
    }

    pub fn with_question_words(model: Arc<dyn GenerativeModel>, words: &[&str]) -> Self {
        Self {
            model,
            markers: words.iter().map(|w| format!("and {}", w)).collect(),
        }
    }

    pub fn is_compound(&self, query: &str) -> bool {
        self.markers.iter().any(|marker| query.contains(marker.as_str()))
    }

    /// Replace every compound query with its multi-chunk sub-questions
    #[instrument(skip(self, dataset), fields(queries = dataset.len()))]
    pub async fn decompose(&self, dataset: &mut Dataset) -> Result<DecompositionReport> {
        let mut report = DecompositionReport::default();

        // Iterate a snapshot; the live maps change underneath
        let snapshot: Vec<(String, String)> = dataset
            .queries
            .iter()
            .map(|(id, text)| (id.clone(), text.clone()))
            .collect();

        for (query_id, query) in snapshot {
            if !self.is_compound(&query) {
                continue;
            }

            let chunks = dataset.grounding_chunks(&query_id)?;
            dataset.remove_query(&query_id);
            report.flagged += 1;
            debug!(query_id = %query_id, "Compound query removed");

            if chunks.is_empty() {
                warn!(query_id = %query_id, "Compound query had no grounding, dropped");
                continue;
            }

            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let reply = ask(self.model.as_ref(), &prompts::split_compound_query(&query, &texts)).await?;
            let parts = parse_parts(&reply, chunks.len())?;

            let mut covered = vec![false; chunks.len()];
            for (sub_question, refs) in parts {
                for &idx in &refs {
                    covered[idx] = true;
                }
                if refs.len() <= 1 {
                    report.dropped += 1;
                    continue;
                }
                let chunk_ids = refs.iter().map(|&idx| chunks[idx].id.clone()).collect();
                let new_id = dataset.add_query(sub_question, chunk_ids);
                report.retained += 1;
                debug!(query_id = %query_id, sub_query_id = %new_id, "Sub-question retained");
            }

            let unmapped = covered.iter().filter(|c| !**c).count();
            if unmapped > 0 {
                warn!(query_id = %query_id, unmapped, "Decomposition left chunks unmapped");
            }
        }

        metrics::record_queries("decomposition", report.retained);
        info!(
            flagged = report.flagged,
            retained = report.retained,
            dropped = report.dropped,
            "Decomposition complete"
        );
        Ok(report)
    }
}

/// Parse `{sub_question: [1-based refs]}` into zero-based, de-duplicated refs
/// in reply order.
fn parse_parts(reply: &str, chunk_count: usize) -> Result<Vec<(String, Vec<usize>)>> {
    let value: Value = serde_json::from_str(strip_code_blocks(reply))
        .map_err(|e| AppError::malformed(STAGE, e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::malformed(STAGE, "expected a JSON object"))?;

    object
        .iter()
        .map(|(question, refs)| {
            let refs = refs.as_array().ok_or_else(|| {
                AppError::malformed(STAGE, format!("references for '{}' are not a list", question))
            })?;

            let mut indices: Vec<usize> = Vec::with_capacity(refs.len());
            for r in refs {
                let idx = r
                    .as_u64()
                    .filter(|&i| i >= 1 && (i as usize) <= chunk_count)
                    .ok_or_else(|| {
                        AppError::malformed(
                            STAGE,
                            format!("chunk reference {} is outside 1..={}", r, chunk_count),
                        )
                    })? as usize
                    - 1;
                if !indices.contains(&idx) {
                    indices.push(idx);
                }
            }
            Ok((question.trim().to_string(), indices))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;
    use crate::source::Chunk;

    fn dataset_with(query: &str) -> (Dataset, String) {
        let mut dataset = Dataset::new();
        for (id, text) in [("c1", "one"), ("c2", "two"), ("c3", "three")] {
            dataset.add_chunk(&Chunk::new(id, text));
        }
        let id = dataset.add_query(query, vec!["c1".into(), "c2".into(), "c3".into()]);
        (dataset, id)
    }

    fn decomposer(reply: &'static str) -> (QueryDecomposer, Arc<MockModel>) {
        let model = Arc::new(MockModel::new(move |_| reply.to_string()));
        (QueryDecomposer::new(model.clone()), model)
    }

    #[test]
    fn test_detection_is_literal_and_case_sensitive() {
        let (decomposer, _) = decomposer("{}");
        assert!(decomposer.is_compound("What is X and how does it work?"));
        assert!(decomposer.is_compound("Explain sand whatnot"));
        assert!(!decomposer.is_compound("What is X And how does it work?"));
        assert!(!decomposer.is_compound("What is X and, how does it work?"));
        assert!(!decomposer.is_compound("How do A and B relate?"));
    }

    #[tokio::test]
    async fn test_and_how_query_is_removed_even_when_nothing_is_retained() {
        let (decomposer, model) = decomposer(r#"{"What is X?": [1], "How does it work?": [3]}"#);
        let (mut dataset, original) = dataset_with("What is X and how does it work?");

        let report = decomposer.decompose(&mut dataset).await.unwrap();
        assert_eq!(report, DecompositionReport { flagged: 1, retained: 0, dropped: 2 });
        assert!(!dataset.queries.contains_key(&original));
        assert!(!dataset.relevant_docs.contains_key(&original));
        assert!(dataset.is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retained_sub_questions_have_multiple_chunks() {
        let (decomposer, model) = decomposer(
            "```json\n{\"What links one and two?\": [2, 1], \"Why three?\": [3, 3]}\n```",
        );
        let (mut dataset, original) = dataset_with("What links one and two and why three?");

        let report = decomposer.decompose(&mut dataset).await.unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(report.dropped, 1);
        assert!(!dataset.queries.contains_key(&original));

        let (new_id, text) = dataset.queries.iter().next().unwrap();
        assert_ne!(new_id, &original);
        assert_eq!(text, "What links one and two?");
        assert_eq!(dataset.relevant_docs[new_id], vec!["c2", "c1"]);
        for docs in dataset.relevant_docs.values() {
            assert!(docs.len() >= 2);
        }
        assert!(dataset.validate().is_empty());

        // Chunks were handed to the model in provenance order
        assert!(model.calls()[0].contains("Chunk 1: one\nChunk 2: two\nChunk 3: three"));
    }

    #[tokio::test]
    async fn test_simple_queries_untouched() {
        let (decomposer, model) = decomposer("{}");
        let (mut dataset, original) = dataset_with("How do one, two and three relate?");
        let before = dataset.clone();

        let report = decomposer.decompose(&mut dataset).await.unwrap();
        assert_eq!(report, DecompositionReport::default());
        assert_eq!(dataset, before);
        assert!(dataset.queries.contains_key(&original));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_replies_propagate() {
        for reply in ["not json", "[1, 2]", r#"{"Q?": "1,2"}"#, r#"{"Q?": [0, 1]}"#, r#"{"Q?": [1, 4]}"#] {
            let (decomposer, _) = decomposer(reply);
            let (mut dataset, _) = dataset_with("What is X and why?");
            let result = decomposer.decompose(&mut dataset).await;
            assert!(
                matches!(result, Err(AppError::MalformedReply { .. })),
                "reply {:?} should be malformed",
                reply
            );
        }
    }

    #[tokio::test]
    async fn test_custom_question_words() {
        let model = Arc::new(MockModel::new(|_| "{}".to_string()));
        let decomposer = QueryDecomposer::with_question_words(model, &["whom"]);
        assert!(decomposer.is_compound("Who wrote it and whom did they thank?"));
        assert!(!decomposer.is_compound("What is X and how does it work?"));
    }
}
