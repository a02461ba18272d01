//! Context assembly and query synthesis pipeline
//!
//! Stages, in control-flow order:
//! - Chunk sampling gated by the quality evaluator
//! - Multi-chunk context construction via similarity search
//! - Query synthesis (single-chunk or multi-context)
//! - Compound query decomposition (multi-context path)
//! - Query evolution (optional)
//! - Answer synthesis (optional)
//!
//! Every stage runs its items strictly in sequence, one boundary call at a time.

pub mod answerer;
pub mod context_builder;
pub mod decomposer;
pub mod evaluator;
pub mod evolver;
pub mod generator;
pub mod prompts;
pub mod query_synthesizer;
pub mod sampler;
pub mod split;

pub use answerer::AnswerSynthesizer;
pub use context_builder::{Context, ContextBounds, ContextBuilder};
pub use decomposer::{DecompositionReport, QueryDecomposer, QUESTION_WORDS};
pub use evaluator::ChunkEvaluator;
pub use evolver::QueryEvolver;
pub use generator::DatasetGenerator;
pub use prompts::EvolutionStrategy;
pub use query_synthesizer::QuerySynthesizer;
pub use sampler::ChunkSampler;
pub use split::{all_chunks, split_sources, DataSplit, Partition, SplitName};

use crate::errors::Result;
use crate::llm::GenerativeModel;

/// Run one prompt and return the consumed reply
pub(crate) async fn ask(model: &dyn GenerativeModel, prompt: &str) -> Result<String> {
    model.run(prompt).await?.into_first()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for stage tests

    use crate::llm::MockModel;
    use crate::source::{InMemorySource, SourceRecord};

    pub const PASS: &str = r#"{"self_containment": 1, "not_metadata": 1}"#;
    pub const FAIL: &str = r#"{"self_containment": 0, "not_metadata": 1}"#;

    /// The text a prompt was built around, taken from its last non-empty line
    pub fn subject(prompt: &str) -> &str {
        prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty() && *line != "Output:")
            .unwrap_or_default()
    }

    /// Passes every chunk whose text does not contain "reject"
    pub fn evaluator_model() -> MockModel {
        MockModel::new(|prompt| {
            if subject(prompt).contains("reject") {
                FAIL.to_string()
            } else {
                PASS.to_string()
            }
        })
    }

    pub fn record(id: &str, source: &str, text: &str, embedding: Vec<f32>) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            source: source.to_string(),
            text: text.to_string(),
            embedding,
        }
    }

    pub fn store(records: Vec<SourceRecord>) -> InMemorySource {
        InMemorySource::new(records).expect("unique ids")
    }

    /// Text long enough to clear the default size threshold
    pub fn long_text(label: &str) -> String {
        format!("{} {}", label, "lorem ipsum dolor sit amet ".repeat(10))
    }
}
