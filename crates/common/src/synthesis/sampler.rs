//! Seeded chunk sampler gated by the quality evaluator

use super::ChunkEvaluator;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::source::Chunk;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, instrument, warn};

/// Draws quality-passing chunks from a deterministically shuffled pool
#[derive(Clone)]
pub struct ChunkSampler {
    evaluator: ChunkEvaluator,
    seed: u64,
}

impl ChunkSampler {
    pub fn new(evaluator: ChunkEvaluator, seed: u64) -> Self {
        Self { evaluator, seed }
    }

    pub fn evaluator(&self) -> &ChunkEvaluator {
        &self.evaluator
    }

    /// Sample up to `n` accepted chunks.
    ///
    /// The pool is shuffled with a fresh RNG seeded from the configured seed,
    /// so the same pool and evaluator always yield the same sequence. Running
    /// out of candidates returns a shorter list.
    #[instrument(skip(self, pool), fields(pool = pool.len()))]
    pub async fn sample(&self, mut pool: Vec<Chunk>, n: usize) -> Result<Vec<Chunk>> {
        if n > pool.len() {
            return Err(AppError::InvalidRequest {
                message: format!(
                    "{} chunks requested but only {} usable chunks were provided",
                    n,
                    pool.len()
                ),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        pool.shuffle(&mut rng);

        let mut accepted = Vec::with_capacity(n);
        let mut evaluated = 0usize;
        while accepted.len() < n {
            let Some(chunk) = pool.pop() else { break };
            evaluated += 1;
            if self.evaluator.accepts(&chunk.text).await? {
                debug!(chunk_id = %chunk.id, "Chunk accepted");
                accepted.push(chunk);
            }
        }

        if accepted.len() < n {
            warn!(
                requested = n,
                accepted = accepted.len(),
                "Chunk pool exhausted before reaching the requested sample size"
            );
            metrics::record_sampler_shortfall(n - accepted.len());
        }

        info!(requested = n, accepted = accepted.len(), evaluated, "Sampling complete");
        Ok(accepted)
    }
}
