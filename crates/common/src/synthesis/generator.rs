//! End-to-end dataset generation
//!
//! Runs the stages in order according to `GenerationConfig` and rewrites the
//! checkpoint after every stage when a checkpoint path is configured.

use super::{
    AnswerSynthesizer, ChunkEvaluator, ChunkSampler, ContextBounds, ContextBuilder,
    DecompositionReport, QueryDecomposer, QueryEvolver, QuerySynthesizer,
};
use crate::config::GenerationConfig;
use crate::dataset::Dataset;
use crate::errors::{AppError, Result};
use crate::llm::GenerativeModel;
use crate::metrics::StageTimer;
use crate::source::{Chunk, SourceAdapter};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

pub struct DatasetGenerator {
    config: GenerationConfig,
    source: Arc<dyn SourceAdapter>,
    model: Arc<dyn GenerativeModel>,
}

impl DatasetGenerator {
    pub fn new(
        config: GenerationConfig,
        source: Arc<dyn SourceAdapter>,
        model: Arc<dyn GenerativeModel>,
    ) -> Result<Self> {
        config.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;
        Ok(Self {
            config,
            source,
            model,
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn sampler(&self) -> ChunkSampler {
        ChunkSampler::new(ChunkEvaluator::new(self.model.clone()), self.config.seed)
    }

    /// Run the configured pipeline over `chunks`.
    ///
    /// `sources` restricts neighbour retrieval and falls back to the
    /// configured allow-list when `None`.
    #[instrument(skip(self, chunks, sources), fields(pool = chunks.len(), multi_context = self.config.multi_context))]
    pub async fn generate(&self, chunks: Vec<Chunk>, sources: Option<Vec<String>>) -> Result<Dataset> {
        // Fail on a bad step list before spending any generative calls
        if self.config.evolve_queries {
            QueryEvolver::resolve_steps(&self.config.evolve_steps)?;
        }

        let sources = sources.or_else(|| self.config.sources.clone());

        let mut dataset = if self.config.multi_context {
            self.generate_multi_context_queries(chunks, sources.as_deref()).await?
        } else {
            self.generate_single_chunk_queries(chunks).await?
        };

        if self.config.evolve_queries {
            self.evolve(&mut dataset).await?;
        }

        if self.config.generate_answers {
            self.answer(&mut dataset).await?;
        }

        info!(
            queries = dataset.len(),
            chunks = dataset.corpus.len(),
            answered = dataset.expected_answers.is_some(),
            "Dataset generation complete"
        );
        Ok(dataset)
    }

    /// One question per sampled chunk
    pub async fn generate_single_chunk_queries(&self, chunks: Vec<Chunk>) -> Result<Dataset> {
        let timer = StageTimer::start("single_chunk");
        let dataset = QuerySynthesizer::new(self.model.clone())
            .single_chunk(
                &self.sampler(),
                self.config.number_of_questions,
                chunks,
                self.config.chunk_size_threshold,
            )
            .await?;
        timer.finish();

        self.checkpoint(&dataset, "single_chunk").await?;
        Ok(dataset)
    }

    /// Build contexts, ask one question per context, then split compound questions
    pub async fn generate_multi_context_queries(
        &self,
        chunks: Vec<Chunk>,
        sources: Option<&[String]>,
    ) -> Result<Dataset> {
        let timer = StageTimer::start("context_building");
        let builder = ContextBuilder::new(
            self.source.clone(),
            self.sampler(),
            ContextBounds::from(&self.config),
        );
        let contexts = builder
            .build(self.config.number_of_questions, chunks, sources)
            .await?;
        timer.finish();

        let timer = StageTimer::start("multi_context");
        let mut dataset = QuerySynthesizer::new(self.model.clone())
            .multi_context(&contexts)
            .await?;
        timer.finish();
        self.checkpoint(&dataset, "multi_context").await?;

        self.decompose(&mut dataset).await?;
        Ok(dataset)
    }

    pub async fn decompose(&self, dataset: &mut Dataset) -> Result<DecompositionReport> {
        let timer = StageTimer::start("decomposition");
        let report = QueryDecomposer::new(self.model.clone())
            .decompose(dataset)
            .await?;
        timer.finish();

        self.checkpoint(dataset, "decomposition").await?;
        Ok(report)
    }

    pub async fn evolve(&self, dataset: &mut Dataset) -> Result<usize> {
        let timer = StageTimer::start("evolution");
        let added = QueryEvolver::new(self.model.clone())
            .evolve(dataset, &self.config.evolve_steps)
            .await?;
        timer.finish();

        self.checkpoint(dataset, "evolution").await?;
        Ok(added)
    }

    pub async fn answer(&self, dataset: &mut Dataset) -> Result<usize> {
        let timer = StageTimer::start("answers");
        let answered = AnswerSynthesizer::new(self.model.clone())
            .answer_all(dataset)
            .await?;
        timer.finish();

        self.checkpoint(dataset, "answers").await?;
        Ok(answered)
    }

    async fn checkpoint(&self, dataset: &Dataset, stage: &str) -> Result<()> {
        let Some(path) = self
            .config
            .checkpoint_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        else {
            return Ok(());
        };

        dataset.save_json(path).await?;
        info!(stage, path = %path.display(), queries = dataset.len(), "Checkpoint saved");
        Ok(())
    }
}
