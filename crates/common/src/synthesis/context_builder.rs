//! Multi-chunk context construction
//!
//! Each sampled seed chunk is expanded with its nearest neighbours while they
//! stay similar enough, distinct from the seed, and pass the quality gate.

use super::ChunkSampler;
use crate::config::GenerationConfig;
use crate::errors::Result;
use crate::metrics;
use crate::source::{cosine_similarity, Chunk, SourceAdapter};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Ordered chunks that together ground one multi-hop question
pub type Context = Vec<Chunk>;

/// Limits applied while growing a context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextBounds {
    /// Contexts with this many chunks or fewer are discarded
    pub min_chunks: usize,
    /// Contexts stop growing at this many chunks
    pub max_chunks: usize,
    /// Neighbours at or below this many characters are skipped
    pub chunk_size_threshold: usize,
    /// Neighbours must be strictly more similar than this
    pub similarity_threshold: f32,
    /// Neighbours retrieved per seed
    pub neighbor_top_k: usize,
    /// Seeds sampled per requested context
    pub seed_oversample: usize,
}

impl From<&GenerationConfig> for ContextBounds {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            min_chunks: config.min_chunks_per_context,
            max_chunks: config.max_chunks_per_context,
            chunk_size_threshold: config.chunk_size_threshold,
            similarity_threshold: config.similarity_threshold,
            neighbor_top_k: config.neighbor_top_k,
            seed_oversample: config.seed_oversample,
        }
    }
}

pub struct ContextBuilder {
    source: Arc<dyn SourceAdapter>,
    sampler: ChunkSampler,
    bounds: ContextBounds,
}

impl ContextBuilder {
    pub fn new(source: Arc<dyn SourceAdapter>, sampler: ChunkSampler, bounds: ContextBounds) -> Self {
        Self {
            source,
            sampler,
            bounds,
        }
    }

    /// Build up to `n` contexts from `chunks`.
    ///
    /// `sources` restricts neighbour retrieval, keeping contexts inside one
    /// partition of a train/validation/test split.
    #[instrument(skip(self, chunks, sources), fields(pool = chunks.len()))]
    pub async fn build(
        &self,
        n: usize,
        chunks: Vec<Chunk>,
        sources: Option<&[String]>,
    ) -> Result<Vec<Context>> {
        let seeds = self
            .sampler
            .sample(chunks, self.bounds.seed_oversample * n)
            .await?;

        let mut contexts = Vec::with_capacity(n);
        for seed in seeds {
            if contexts.len() == n {
                break;
            }

            let context = self.expand(seed, sources).await?;
            if context.len() <= self.bounds.min_chunks {
                debug!(size = context.len(), "Context too small, discarded");
                metrics::record_context(false);
                continue;
            }

            debug!(size = context.len(), "Context kept");
            metrics::record_context(true);
            contexts.push(context);
        }

        info!(requested = n, built = contexts.len(), "Context building complete");
        Ok(contexts)
    }

    /// Grow one context around `seed`
    async fn expand(&self, seed: Chunk, sources: Option<&[String]>) -> Result<Context> {
        let seed_embedding = self.source.embedding_of(&seed).await?;
        let neighbors = self
            .source
            .nearest_neighbors(&seed_embedding, self.bounds.neighbor_top_k, sources)
            .await?;

        let mut context = vec![seed];
        for neighbor in neighbors {
            if context.len() >= self.bounds.max_chunks {
                break;
            }

            let seed = &context[0];
            // The store returns the seed as its own nearest neighbour
            if neighbor.id == seed.id {
                continue;
            }

            if neighbor.content.chars().count() <= self.bounds.chunk_size_threshold {
                continue;
            }
            if !self.sampler.evaluator().accepts(&neighbor.content).await? {
                continue;
            }

            if neighbor.content == seed.text {
                debug!(neighbor_id = %neighbor.id, "Duplicate of seed, stopping expansion");
                break;
            }

            let similarity = cosine_similarity(&seed_embedding, &neighbor.embedding);
            if similarity > self.bounds.similarity_threshold {
                context.push(neighbor.to_chunk());
            }
        }

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;
    use crate::source::{InMemorySource, Neighbor, SourceRecord};
    use crate::synthesis::testing::{evaluator_model, long_text, record, store};
    use crate::synthesis::ChunkEvaluator;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    /// Store whose neighbour search comes back empty for one query vector
    struct NoNeighborsAt {
        inner: InMemorySource,
        silent: Vec<f32>,
    }

    #[async_trait]
    impl SourceAdapter for NoNeighborsAt {
        async fn list_sources(&self) -> Result<BTreeSet<String>> {
            self.inner.list_sources().await
        }

        async fn chunks_for(&self, sources: &[String]) -> Result<Vec<Chunk>> {
            self.inner.chunks_for(sources).await
        }

        async fn embedding_of(&self, chunk: &Chunk) -> Result<Vec<f32>> {
            self.inner.embedding_of(chunk).await
        }

        async fn nearest_neighbors(
            &self,
            embedding: &[f32],
            top_k: usize,
            sources: Option<&[String]>,
        ) -> Result<Vec<Neighbor>> {
            if embedding == self.silent.as_slice() {
                return Ok(Vec::new());
            }
            self.inner.nearest_neighbors(embedding, top_k, sources).await
        }
    }

    fn builder(records: Vec<SourceRecord>, bounds: ContextBounds) -> (ContextBuilder, Arc<MockModel>) {
        let model = Arc::new(evaluator_model());
        let sampler = ChunkSampler::new(ChunkEvaluator::new(model.clone()), 42);
        (ContextBuilder::new(Arc::new(store(records)), sampler, bounds), model)
    }

    fn bounds(min: usize, max: usize) -> ContextBounds {
        ContextBounds {
            min_chunks: min,
            max_chunks: max,
            chunk_size_threshold: 20,
            similarity_threshold: 0.5,
            neighbor_top_k: 10,
            seed_oversample: 1,
        }
    }

    fn seed_chunk(records: &[SourceRecord]) -> Vec<Chunk> {
        vec![Chunk::new(records[0].id.clone(), records[0].text.clone())]
    }

    /// Unit vector at `degrees` from the x axis; cosine to the seed is cos(degrees)
    fn at(degrees: f32) -> Vec<f32> {
        let r = degrees.to_radians();
        vec![r.cos(), r.sin()]
    }

    #[tokio::test]
    async fn test_context_grows_with_similar_neighbors() {
        let records = vec![
            record("s", "doc", &long_text("seed"), at(0.0)),
            record("n1", "doc", &long_text("near one"), at(10.0)),
            record("n2", "doc", &long_text("near two"), at(20.0)),
            record("far", "doc", &long_text("far away"), at(80.0)),
        ];
        let seeds = seed_chunk(&records);
        let (builder, _) = builder(records, bounds(1, 5));

        let contexts = builder.build(1, seeds, None).await.unwrap();
        assert_eq!(contexts.len(), 1);
        let ids: Vec<_> = contexts[0].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s", "n1", "n2"]);
    }

    #[tokio::test]
    async fn test_similarity_equal_to_threshold_is_excluded() {
        let records = vec![
            record("s", "doc", &long_text("seed"), vec![1.0, 0.0]),
            record("edge", "doc", &long_text("edge"), vec![0.5, 0.75f32.sqrt()]),
            record("n1", "doc", &long_text("near"), at(5.0)),
        ];
        let seeds = seed_chunk(&records);
        let mut b = bounds(1, 5);
        // cos(seed, edge) is 0.5 up to float rounding; pin the threshold to it
        b.similarity_threshold = cosine_similarity(&[1.0, 0.0], &[0.5, 0.75f32.sqrt()]);
        let (builder, _) = builder(records, b);

        let contexts = builder.build(1, seeds, None).await.unwrap();
        let ids: Vec<_> = contexts[0].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s", "n1"]);
    }

    #[tokio::test]
    async fn test_identical_text_halts_expansion() {
        let seed_text = long_text("seed");
        let records = vec![
            record("s", "doc", &seed_text, at(0.0)),
            record("n1", "doc", &long_text("near one"), at(5.0)),
            record("dup", "doc", &seed_text, at(10.0)),
            record("n2", "doc", &long_text("near two"), at(15.0)),
            record("n3", "doc", &long_text("near three"), at(20.0)),
        ];
        let seeds = seed_chunk(&records);
        let (builder, _) = builder(records, bounds(1, 5));

        let contexts = builder.build(1, seeds, None).await.unwrap();
        let ids: Vec<_> = contexts[0].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s", "n1"]);
    }

    #[tokio::test]
    async fn test_short_and_rejected_neighbors_are_skipped() {
        let records = vec![
            record("s", "doc", &long_text("seed"), at(0.0)),
            record("short", "doc", "tiny", at(2.0)),
            record("bad", "doc", &long_text("reject me"), at(4.0)),
            record("n1", "doc", &long_text("near"), at(6.0)),
        ];
        let seeds = seed_chunk(&records);
        let (builder, _) = builder(records, bounds(1, 5));

        let contexts = builder.build(1, seeds, None).await.unwrap();
        let ids: Vec<_> = contexts[0].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s", "n1"]);
    }

    #[tokio::test]
    async fn test_context_bounds_hold() {
        let mut records = vec![record("s", "doc", &long_text("seed"), at(0.0))];
        for i in 1..8 {
            records.push(record(&format!("n{}", i), "doc", &long_text(&format!("near {}", i)), at(i as f32)));
        }
        let seeds = seed_chunk(&records);
        let (builder, _) = builder(records, bounds(2, 4));

        let contexts = builder.build(1, seeds, None).await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert!(contexts.iter().all(|c| c.len() > 2 && c.len() <= 4));
        assert_eq!(contexts[0].len(), 4);
    }

    #[tokio::test]
    async fn test_small_context_discarded_without_neighbors() {
        let records = vec![
            record("s", "doc", &long_text("seed"), at(0.0)),
            record("far", "other", &long_text("far"), at(90.0)),
        ];
        let seeds = seed_chunk(&records);
        let (builder, _) = builder(records, bounds(1, 5));

        // Restricting to "other" leaves no similar neighbour for the seed
        let allowed = vec!["other".to_string()];
        let contexts = builder.build(1, seeds, Some(&allowed)).await.unwrap();
        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn test_seed_without_neighbors_is_judged_on_its_own_context() {
        let lone = at(120.0);
        let records = vec![
            record("s1", "doc", &long_text("seed one"), at(0.0)),
            record("n1", "doc", &long_text("near one"), at(5.0)),
            record("n2", "doc", &long_text("near two"), at(10.0)),
            record("s2", "doc", &long_text("seed two"), lone.clone()),
        ];
        let seeds = vec![
            Chunk::new("s1", records[0].text.clone()),
            Chunk::new("s2", records[3].text.clone()),
        ];
        let source = NoNeighborsAt {
            inner: store(records),
            silent: lone,
        };
        let sampler = ChunkSampler::new(ChunkEvaluator::new(Arc::new(evaluator_model())), 42);
        let builder = ContextBuilder::new(Arc::new(source), sampler, bounds(1, 5));

        let contexts = builder.build(2, seeds, None).await.unwrap();
        assert_eq!(contexts.len(), 1);
        let ids: Vec<_> = contexts[0].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "n1", "n2"]);
    }

    #[tokio::test]
    async fn test_build_stops_after_n_contexts() {
        let mut records = Vec::new();
        for cluster in 0..3 {
            let base = cluster as f32 * 40.0;
            records.push(record(&format!("s{}", cluster), "doc", &long_text(&format!("seed {}", cluster)), at(base)));
            records.push(record(&format!("m{}", cluster), "doc", &long_text(&format!("mate {}", cluster)), at(base + 3.0)));
            records.push(record(&format!("k{}", cluster), "doc", &long_text(&format!("kin {}", cluster)), at(base + 6.0)));
        }
        let seeds: Vec<Chunk> = records
            .iter()
            .filter(|r| r.id.starts_with('s'))
            .map(|r| Chunk::new(r.id.clone(), r.text.clone()))
            .collect();
        let mut b = bounds(1, 3);
        b.seed_oversample = 3;
        b.similarity_threshold = 0.9;
        let (builder, model) = builder(records, b);

        let contexts = builder.build(1, seeds, None).await.unwrap();
        assert_eq!(contexts.len(), 1);
        // Three seed evaluations plus two neighbour evaluations for the first seed only
        assert_eq!(model.call_count(), 5);
    }
}
