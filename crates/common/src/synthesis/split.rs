//! Source-level train / validation / test partitioning
//!
//! Splitting by source, not by chunk, keeps every chunk of a document in one
//! partition so neighbour retrieval cannot leak material across partitions.

use crate::config::validate_split_ratio;
use crate::errors::{AppError, Result};
use crate::source::{Chunk, SourceAdapter};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::str::FromStr;
use tracing::info;

/// One partition of a split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub sources: Vec<String>,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSplit {
    pub train: Partition,
    pub validation: Partition,
    pub test: Partition,
}

/// Names a partition on the command line and in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitName {
    Train,
    Validation,
    Test,
}

impl FromStr for SplitName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(SplitName::Train),
            "validation" | "val" => Ok(SplitName::Validation),
            "test" => Ok(SplitName::Test),
            other => Err(AppError::InvalidRequest {
                message: format!("unknown split '{}'", other),
            }),
        }
    }
}

impl DataSplit {
    pub fn take(self, name: SplitName) -> Partition {
        match name {
            SplitName::Train => self.train,
            SplitName::Validation => self.validation,
            SplitName::Test => self.test,
        }
    }
}

/// Cut points for `len` items: `floor(len*r0)` and `floor(len*(r0+r1))`
fn cut_points(len: usize, ratio: &[f64; 3]) -> (usize, usize) {
    let train_end = ((len as f64 * ratio[0]) as usize).min(len);
    let val_end = ((len as f64 * (ratio[0] + ratio[1])) as usize).clamp(train_end, len);
    (train_end, val_end)
}

/// Shuffle the sources with `seed` and partition them by `ratio`
pub async fn split_sources(
    source: &dyn SourceAdapter,
    ratio: &[f64; 3],
    seed: u64,
) -> Result<DataSplit> {
    validate_split_ratio(ratio).map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("split_ratio".to_string()),
    })?;

    // Listing is a set; sort before shuffling so the seed alone decides order
    let mut sources: Vec<String> = source.list_sources().await?.into_iter().collect();
    if sources.is_empty() {
        return Err(AppError::InvalidRequest {
            message: "the chunk store has no sources to split".to_string(),
        });
    }
    sources.sort();

    let mut rng = StdRng::seed_from_u64(seed);
    sources.shuffle(&mut rng);

    let (train_end, val_end) = cut_points(sources.len(), ratio);
    let test_sources = sources.split_off(val_end);
    let val_sources = sources.split_off(train_end);
    let train_sources = sources;

    let split = DataSplit {
        train: Partition {
            chunks: source.chunks_for(&train_sources).await?,
            sources: train_sources,
        },
        validation: Partition {
            chunks: source.chunks_for(&val_sources).await?,
            sources: val_sources,
        },
        test: Partition {
            chunks: source.chunks_for(&test_sources).await?,
            sources: test_sources,
        },
    };

    info!(
        train_sources = split.train.sources.len(),
        validation_sources = split.validation.sources.len(),
        test_sources = split.test.sources.len(),
        train_chunks = split.train.chunks.len(),
        validation_chunks = split.validation.chunks.len(),
        test_chunks = split.test.chunks.len(),
        "Sources split"
    );
    Ok(split)
}

/// Every chunk from every source
pub async fn all_chunks(source: &dyn SourceAdapter) -> Result<Vec<Chunk>> {
    let sources: Vec<String> = source.list_sources().await?.into_iter().collect();
    source.chunks_for(&sources).await
}
