//! Tabular export of a dataset for reporting and evaluation harnesses

use super::Dataset;
use crate::errors::{AppError, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncWriteExt;

/// Row layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `query`, optional `expected_answer`, then `context_1..context_n`
    Plain,
    /// `input`, `expected_output`, `context` (JSON array of chunk texts)
    DeepEval,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(ExportFormat::Plain),
            "deep-eval" | "deep_eval" => Ok(ExportFormat::DeepEval),
            other => Err(AppError::InvalidRequest {
                message: format!("unknown export format '{}'", other),
            }),
        }
    }
}

pub type Row = Map<String, Value>;

fn required_answer<'a>(dataset: &'a Dataset, query_id: &str) -> Result<&'a str> {
    dataset.answer(query_id).ok_or_else(|| AppError::Validation {
        message: format!("query {} has no expected answer", query_id),
        field: Some("expected_answers".to_string()),
    })
}

/// One row per query, in query id order
pub fn to_rows(dataset: &Dataset, format: ExportFormat) -> Result<Vec<Row>> {
    let with_answers = dataset.expected_answers.is_some();

    dataset
        .queries
        .iter()
        .map(|(query_id, query)| {
            let texts: Vec<String> = dataset
                .grounding_chunks(query_id)?
                .into_iter()
                .map(|c| c.text)
                .collect();

            let mut row = Row::new();
            match format {
                ExportFormat::Plain => {
                    row.insert("query".into(), Value::String(query.clone()));
                    if with_answers {
                        let answer = required_answer(dataset, query_id)?;
                        row.insert("expected_answer".into(), Value::String(answer.to_string()));
                    }
                    for (i, text) in texts.into_iter().enumerate() {
                        row.insert(format!("context_{}", i + 1), Value::String(text));
                    }
                }
                ExportFormat::DeepEval => {
                    let answer = required_answer(dataset, query_id)?;
                    row.insert("input".into(), Value::String(query.clone()));
                    row.insert("expected_output".into(), Value::String(answer.to_string()));
                    row.insert("context".into(), Value::String(serde_json::to_string(&texts)?));
                }
            }
            Ok(row)
        })
        .collect()
}

/// Write rows as JSON Lines, returning the number written
pub async fn write_jsonl(rows: &[Row], path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(path).await?;
    for row in rows {
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        file.write_all(&line).await?;
    }
    file.flush().await?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Chunk;

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.add_chunk(&Chunk::new("c1", "alpha"));
        dataset.add_chunk(&Chunk::new("c2", "beta"));
        dataset.insert_query("q1".into(), "Q?", vec!["c2".into(), "c1".into()]);
        dataset
    }

    #[test]
    fn test_plain_rows_without_answers() {
        let rows = to_rows(&dataset(), ExportFormat::Plain).unwrap();
        assert_eq!(rows.len(), 1);
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["query", "context_1", "context_2"]);
        assert_eq!(rows[0]["context_1"], "beta");
    }

    #[test]
    fn test_plain_rows_with_answers() {
        let mut dataset = dataset();
        dataset.set_answer("q1".into(), "A.".into());
        let rows = to_rows(&dataset, ExportFormat::Plain).unwrap();
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["query", "expected_answer", "context_1", "context_2"]);
    }

    #[test]
    fn test_deep_eval_requires_answers() {
        assert!(to_rows(&dataset(), ExportFormat::DeepEval).is_err());

        let mut dataset = dataset();
        dataset.set_answer("q1".into(), "A.".into());
        let rows = to_rows(&dataset, ExportFormat::DeepEval).unwrap();
        assert_eq!(rows[0]["input"], "Q?");
        assert_eq!(rows[0]["context"], r#"["beta","alpha"]"#);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("plain".parse::<ExportFormat>().unwrap(), ExportFormat::Plain);
        assert_eq!("deep-eval".parse::<ExportFormat>().unwrap(), ExportFormat::DeepEval);
        assert!("csv".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_write_jsonl() {
        let rows = to_rows(&dataset(), ExportFormat::Plain).unwrap();
        let path = std::env::temp_dir().join(format!("qaforge-export-{}.jsonl", uuid::Uuid::new_v4()));
        assert_eq!(write_jsonl(&rows, &path).await.unwrap(), 1);

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written.lines().count(), 1);
        let parsed: Row = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(parsed, rows[0]);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
