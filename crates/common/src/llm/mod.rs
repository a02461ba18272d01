//! Generative model interface
//!
//! Provides:
//! - The `GenerativeModel` capability used by every pipeline stage
//! - An OpenAI-compatible chat completions client
//! - A scripted mock for tests and offline dry runs

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Output of one generative call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub replies: Vec<String>,
}

impl Generation {
    pub fn single(reply: impl Into<String>) -> Self {
        Self {
            replies: vec![reply.into()],
        }
    }

    /// The reply the pipeline consumes
    pub fn into_first(self) -> Result<String> {
        self.replies.into_iter().next().ok_or(AppError::EmptyReply)
    }
}

/// Capability interface over a text generation backend
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Run a single prompt. No retry is attempted.
    async fn run(&self, prompt: &str) -> Result<Generation>;

    /// Model identifier used in logs and metrics
    fn model_name(&self) -> &str;
}

/// Remove Markdown code fences a model may wrap structured output in
pub fn strip_code_blocks(reply: &str) -> &str {
    reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChatModel {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiChatModel {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    async fn call(&self, prompt: &str) -> Result<Generation> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await?;

        Ok(Generation {
            replies: chat_response
                .choices
                .into_iter()
                .filter_map(|c| c.message.content)
                .collect(),
        })
    }
}

#[async_trait]
impl GenerativeModel for OpenAiChatModel {
    async fn run(&self, prompt: &str) -> Result<Generation> {
        let start = Instant::now();
        let result = self.call(prompt).await;
        let elapsed = start.elapsed().as_secs_f64();

        metrics::record_llm_call(elapsed, &self.config.model, result.is_ok());
        match &result {
            Ok(generation) => debug!(
                model = %self.config.model,
                replies = generation.replies.len(),
                elapsed_secs = elapsed,
                "Generative call completed"
            ),
            Err(e) => warn!(model = %self.config.model, error = %e, "Generative call failed"),
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Scripted model: every prompt is answered by a responder closure.
/// Prompts are recorded in call order.
pub struct MockModel {
    responder: Box<Responder>,
    calls: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::fallible(move |prompt| Ok(responder(prompt)))
    }

    /// Responder that may fail, to exercise error propagation
    pub fn fallible<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Offline responder: passes every quality check, decomposes nothing,
    /// and answers everything else with a fixed question.
    pub fn dry_run() -> Self {
        Self::new(|prompt| {
            if prompt.contains("\"self_containment\"") {
                r#"{"self_containment": 1, "not_metadata": 1}"#.to_string()
            } else if prompt.contains("SEPARATOR") {
                "\"What links these passages together?\"".to_string()
            } else if prompt.contains("1-based") {
                "{}".to_string()
            } else {
                "What is described in this passage?".to_string()
            }
        })
    }

    /// Prompts received so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn run(&self, prompt: &str) -> Result<Generation> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }
        (self.responder)(prompt).map(Generation::single)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Create a generative model based on configuration
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn GenerativeModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config.clone())?)),
        "mock" => {
            warn!("Using the offline mock model; generated content is placeholder text");
            Ok(Arc::new(MockModel::dry_run()))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown llm provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  plain  "), "plain");
    }

    #[test]
    fn test_generation_first_reply() {
        let generation = Generation {
            replies: vec!["one".into(), "two".into()],
        };
        assert_eq!(generation.into_first().unwrap(), "one");
        assert!(matches!(Generation::default().into_first(), Err(AppError::EmptyReply)));
    }

    #[tokio::test]
    async fn test_mock_model_records_calls() {
        let model = MockModel::new(|prompt| prompt.to_uppercase());
        let generation = model.run("hello").await.unwrap();
        assert_eq!(generation.replies, vec!["HELLO"]);
        assert_eq!(model.calls(), vec!["hello"]);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_model_failure() {
        let model = MockModel::fallible(|_| {
            Err(AppError::Llm {
                message: "quota exceeded".into(),
            })
        });
        assert!(matches!(model.run("x").await, Err(AppError::Llm { .. })));
    }

    #[tokio::test]
    async fn test_transport_failure_is_http_client_error() {
        let config = LlmConfig {
            endpoint: "not a url".into(),
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        let model = match OpenAiChatModel::new(config) {
            Ok(model) => model,
            Err(e) => panic!("client setup failed: {}", e),
        };

        let err = model.run("hello").await.unwrap_err();
        assert!(matches!(err, AppError::HttpClient(_)));
        assert_eq!(err.code(), crate::errors::ErrorCode::UpstreamError);
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_create_model() {
        let mut config = LlmConfig::default();
        assert!(matches!(create_model(&config), Err(AppError::Configuration { .. })));

        config.api_key = Some("sk-test".into());
        assert_eq!(create_model(&config).unwrap().model_name(), "gpt-4o-mini");

        config.provider = "mock".into();
        assert_eq!(create_model(&config).unwrap().model_name(), "mock");

        config.provider = "llama".into();
        assert!(create_model(&config).is_err());
    }
}
