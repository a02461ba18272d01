//! Chunk quality evaluator
//!
//! Scores whether a chunk stands on its own and is mostly content rather
//! than metadata. Unparsable replies fall back to rejection.

use super::{ask, prompts};
use crate::errors::Result;
use crate::llm::{strip_code_blocks, GenerativeModel};
use crate::metrics;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const SUB_SCORES: [&str; 2] = ["self_containment", "not_metadata"];

/// Binary chunk quality gate backed by one generative call per chunk
#[derive(Clone)]
pub struct ChunkEvaluator {
    model: Arc<dyn GenerativeModel>,
}

impl ChunkEvaluator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Score a chunk: 1 when both sub-scores are 1, otherwise 0.
    ///
    /// A reply that cannot be parsed scores 0 and is logged. Only a failed
    /// model call is returned as an error.
    pub async fn score(&self, chunk_text: &str) -> Result<u8> {
        let reply = ask(self.model.as_ref(), &prompts::evaluate_chunk(chunk_text)).await?;

        let score = match parse_scores(&reply) {
            Some(true) => 1,
            Some(false) => 0,
            None => {
                warn!(reply = %reply, "Unparsable chunk evaluation, falling back to score 0");
                0
            }
        };

        metrics::record_chunk_evaluation(score == 1);
        debug!(score, "Chunk evaluated");
        Ok(score)
    }

    pub async fn accepts(&self, chunk_text: &str) -> Result<bool> {
        Ok(self.score(chunk_text).await? == 1)
    }
}

fn is_one(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

/// `None` when the reply is not a JSON object
fn parse_scores(reply: &str) -> Option<bool> {
    let value: Value = serde_json::from_str(strip_code_blocks(reply)).ok()?;
    let scores = value.as_object()?;
    Some(
        SUB_SCORES
            .iter()
            .all(|key| scores.get(*key).map_or(false, is_one)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::llm::MockModel;

    fn evaluator_with(reply: &'static str) -> ChunkEvaluator {
        ChunkEvaluator::new(Arc::new(MockModel::new(move |_| reply.to_string())))
    }

    #[tokio::test]
    async fn test_both_scores_required() {
        assert_eq!(evaluator_with(r#"{"self_containment": 1, "not_metadata": 1}"#).score("x").await.unwrap(), 1);
        assert_eq!(evaluator_with(r#"{"self_containment": 0, "not_metadata": 1}"#).score("x").await.unwrap(), 0);
        assert_eq!(evaluator_with(r#"{"self_containment": 1, "not_metadata": 0}"#).score("x").await.unwrap(), 0);
        assert_eq!(evaluator_with(r#"{"self_containment": 1}"#).score("x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fenced_and_string_scores() {
        let fenced = "```json\n{\"self_containment\": \"1\", \"not_metadata\": 1.0}\n```";
        assert_eq!(evaluator_with(fenced).score("x").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_reply_scores_zero() {
        assert_eq!(evaluator_with("Looks fine to me!").score("x").await.unwrap(), 0);
        assert_eq!(evaluator_with("[1, 1]").score("x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = MockModel::fallible(|_| Err(AppError::Llm { message: "down".into() }));
        let evaluator = ChunkEvaluator::new(Arc::new(model));
        assert!(matches!(evaluator.score("x").await, Err(AppError::Llm { .. })));
    }

    #[tokio::test]
    async fn test_single_call_per_evaluation() {
        let model = Arc::new(MockModel::new(|_| "not json".to_string()));
        let evaluator = ChunkEvaluator::new(model.clone());
        assert!(!evaluator.accepts("some chunk").await.unwrap());
        assert_eq!(model.call_count(), 1);
        assert!(model.calls()[0].contains("some chunk"));
    }
}
