//! Postgres + pgvector chunk store
//!
//! Expects a table shaped like:
//! `(id TEXT PRIMARY KEY, source TEXT NOT NULL, content TEXT NOT NULL, embedding VECTOR)`

use super::{Chunk, Neighbor, SourceAdapter};
use crate::db::{parse_vector_literal, to_vector_literal, DbPool};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement, Value};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Source adapter over a pgvector table
pub struct PgVectorSource {
    pool: DbPool,
    table: String,
}

impl PgVectorSource {
    /// The table name is interpolated into SQL, so only plain identifiers
    /// (optionally schema-qualified) are accepted.
    pub fn new(pool: DbPool, table: &str) -> Result<Self> {
        if !is_identifier(table) {
            return Err(AppError::Configuration {
                message: format!("invalid chunk table name '{}'", table),
            });
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// "$start, $start+1, ..." for `count` bound values
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_embedding(row: &QueryResult, idx: usize) -> Option<Vec<f32>> {
    let text = row.try_get_by_index::<String>(idx).ok()?;
    parse_vector_literal(&text)
}

#[async_trait]
impl SourceAdapter for PgVectorSource {
    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<BTreeSet<String>> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            format!("SELECT DISTINCT source FROM {}", self.table),
        );

        let rows = self.pool.read().query_all(stmt).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get_by_index::<String>(0).ok())
            .collect())
    }

    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    async fn chunks_for(&self, sources: &[String]) -> Result<Vec<Chunk>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, content FROM {} WHERE source IN ({}) ORDER BY source, id",
            self.table,
            placeholders(1, sources.len())
        );
        let values: Vec<Value> = sources.iter().map(|s| s.clone().into()).collect();
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);

        let rows = self.pool.read().query_all(stmt).await?;

        let chunks: Vec<Chunk> = rows
            .into_iter()
            .filter_map(|row| {
                Some(Chunk {
                    id: row.try_get_by_index::<String>(0).ok()?,
                    text: row.try_get_by_index::<String>(1).ok()?,
                })
            })
            .collect();

        debug!(chunks = chunks.len(), "Fetched chunks");
        Ok(chunks)
    }

    async fn embedding_of(&self, chunk: &Chunk) -> Result<Vec<f32>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &format!("SELECT embedding::text FROM {} WHERE id = $1", self.table),
            vec![chunk.id.clone().into()],
        );

        let row = self
            .pool
            .read()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::InvalidRequest {
                message: format!("chunk '{}' not found in {}", chunk.id, self.table),
            })?;

        decode_embedding(&row, 0).ok_or_else(|| AppError::Internal {
            message: format!("chunk '{}' has an unreadable embedding", chunk.id),
        })
    }

    #[instrument(skip(self, embedding, sources))]
    async fn nearest_neighbors(
        &self,
        embedding: &[f32],
        top_k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<Neighbor>> {
        let mut values: Vec<Value> = vec![to_vector_literal(embedding).into(), (top_k as i64).into()];

        let source_filter = match sources {
            Some(allowed) if allowed.is_empty() => return Ok(Vec::new()),
            Some(allowed) => {
                values.extend(allowed.iter().map(|s| Value::from(s.clone())));
                format!("AND source IN ({})", placeholders(3, allowed.len()))
            }
            None => String::new(),
        };

        let sql = format!(
            r#"
            SELECT id, content, embedding::text
            FROM {}
            WHERE embedding IS NOT NULL
            {}
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            self.table, source_filter
        );

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
        let rows = self.pool.read().query_all(stmt).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(Neighbor {
                    id: row.try_get_by_index::<String>(0).ok()?,
                    content: row.try_get_by_index::<String>(1).ok()?,
                    embedding: decode_embedding(&row, 2)?,
                })
            })
            .collect())
    }
}
