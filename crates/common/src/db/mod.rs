//! Database connection management for the pgvector chunk store
//!
//! Provides:
//! - Connection pool setup from configuration
//! - Connectivity checks
//! - pgvector literal encoding and decoding

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    connection: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to chunk store database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { connection })
    }

    /// Get the connection (the store is only ever read)
    pub fn read(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.connection
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Encode an embedding as a pgvector literal: "[1.0,2.0,...]"
pub fn to_vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Parse a pgvector text value back into floats
pub fn parse_vector_literal(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_format() {
        assert_eq!(to_vector_literal(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
    }

    #[test]
    fn test_parse_vector_literal() {
        assert_eq!(parse_vector_literal("[1, 2.5,-3]"), Some(vec![1.0, 2.5, -3.0]));
        assert_eq!(parse_vector_literal("[]"), Some(vec![]));
        assert_eq!(parse_vector_literal("[1,abc]"), None);
    }
}
