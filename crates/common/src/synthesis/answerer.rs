//! Reference answer generation

use super::{ask, prompts};
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::llm::GenerativeModel;
use crate::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct AnswerSynthesizer {
    model: Arc<dyn GenerativeModel>,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Answer every query from its grounding chunks.
    ///
    /// Answers are stored only once all of them succeed; any failure leaves
    /// the dataset untouched.
    #[instrument(skip(self, dataset), fields(queries = dataset.len()))]
    pub async fn answer_all(&self, dataset: &mut Dataset) -> Result<usize> {
        let mut answers = BTreeMap::new();

        for (query_id, query) in &dataset.queries {
            let chunks: Vec<String> = dataset
                .grounding_chunks(query_id)?
                .into_iter()
                .map(|c| c.text)
                .collect();

            let answer = ask(self.model.as_ref(), &prompts::answer_query(query, &chunks)).await?;
            debug!(query_id = %query_id, chars = answer.len(), "Answer generated");
            answers.insert(query_id.clone(), answer.trim().to_string());
        }

        let count = answers.len();
        for (query_id, answer) in answers {
            dataset.set_answer(query_id, answer);
        }

        metrics::record_queries("answers", count);
        info!(answers = count, "Answer synthesis complete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::llm::MockModel;
    use crate::source::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.add_chunk(&Chunk::new("c1", "Tokio is an async runtime."));
        dataset.add_chunk(&Chunk::new("c2", "It schedules tasks."));
        dataset.add_query("What is Tokio?", vec!["c1".into()]);
        dataset.add_query("How does Tokio run tasks?", vec!["c1".into(), "c2".into()]);
        dataset
    }

    #[tokio::test]
    async fn test_every_query_gets_an_answer() {
        let model = Arc::new(MockModel::new(|_| " An answer. ".to_string()));
        let answerer = AnswerSynthesizer::new(model.clone());
        let mut dataset = dataset();

        assert_eq!(answerer.answer_all(&mut dataset).await.unwrap(), 2);
        for query_id in dataset.queries.keys() {
            assert_eq!(dataset.answer(query_id), Some("An answer."));
        }
        assert!(model.calls()[1].contains("Chunk 1: Tokio is an async runtime.\nChunk 2: It schedules tasks."));
    }

    #[tokio::test]
    async fn test_failure_propagates_without_partial_answers() {
        let calls = AtomicUsize::new(0);
        let model = MockModel::fallible(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("first".to_string())
            } else {
                Err(AppError::Llm { message: "rate limited".into() })
            }
        });
        let answerer = AnswerSynthesizer::new(Arc::new(model));
        let mut dataset = dataset();

        assert!(matches!(answerer.answer_all(&mut dataset).await, Err(AppError::Llm { .. })));
        assert!(dataset.expected_answers.is_none());
    }
}
