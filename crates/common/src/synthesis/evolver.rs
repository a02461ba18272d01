//! Query evolution: rewrite each query once per strategy, keeping its grounding

use super::{ask, EvolutionStrategy};
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::llm::GenerativeModel;
use crate::metrics;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct QueryEvolver {
    model: Arc<dyn GenerativeModel>,
}

impl QueryEvolver {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Resolve step names, failing on the first unknown one
    pub fn resolve_steps<S: AsRef<str>>(steps: &[S]) -> Result<Vec<EvolutionStrategy>> {
        steps.iter().map(|s| s.as_ref().parse()).collect()
    }

    /// Add one evolved variant per query per step.
    ///
    /// Originals stay under their ids. Variants get fresh ids and the same
    /// `relevant_docs` as their original, and are merged in after the sweep.
    /// Returns the number of variants added.
    ///
    /// Existing answers are kept, but variants get none, so answers must be
    /// regenerated after evolving an answered dataset.
    #[instrument(skip(self, dataset, steps), fields(queries = dataset.len(), steps = steps.len()))]
    pub async fn evolve<S: AsRef<str>>(&self, dataset: &mut Dataset, steps: &[S]) -> Result<usize> {
        let strategies = Self::resolve_steps(steps)?;

        if dataset.expected_answers.is_some() {
            warn!("Dataset already has answers; evolved variants will have none until answers are regenerated");
        }

        let mut evolved = Dataset::new();
        for (query_id, query) in &dataset.queries {
            let context = dataset.context_text(query_id)?;
            let grounding = dataset.relevant_docs.get(query_id).cloned().unwrap_or_default();

            for strategy in &strategies {
                let rewritten = ask(self.model.as_ref(), &strategy.prompt(query, &context)).await?;
                let new_id = evolved.add_query(rewritten.trim(), grounding.clone());
                debug!(query_id = %query_id, evolved_id = %new_id, strategy = %strategy, "Query evolved");
            }
        }

        let added = evolved.len();
        dataset.merge(evolved);

        metrics::record_queries("evolution", added);
        info!(added, total = dataset.len(), "Evolution complete");
        Ok(added)
    }
}
