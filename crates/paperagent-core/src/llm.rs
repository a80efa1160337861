//! Chat-completion client abstraction.
//!
//! [`ChatCompletion`] is the seam the planner talks through; the shipped
//! implementation speaks the OpenAI-compatible `/v1/chat/completions`
//! protocol, which also covers local inference servers exposing the same
//! endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::security::SecretValue;
use crate::AgentError;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A single chat exchange: one system message, one user message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Ask the server to constrain output to a JSON object.
    pub json_output: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Minimal completion interface the planner depends on.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, AgentError>;
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiChatClient {
    endpoint: String,
    model: String,
    api_key: SecretValue,
    http_client: Client,
    timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(endpoint: String, model: String, api_key: SecretValue) -> Result<Self, AgentError> {
        Self::with_timeout(
            endpoint,
            model,
            api_key,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        endpoint: String,
        model: String,
        api_key: SecretValue,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AgentError::Planner(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            endpoint,
            model,
            api_key,
            http_client,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, AgentError> {
        let url = format!("{}/v1/chat/completions", self.endpoint);

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: request.system,
                },
                Message {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            response_format: request.json_output.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
            stream: Some(false),
        };

        debug!(
            model = %self.model,
            prompt_chars = body.messages[1].content.len(),
            "sending chat completion request"
        );

        let start = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    error!(timeout_secs = self.timeout.as_secs(), "chat request timed out");
                    AgentError::Planner(format!(
                        "chat request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else if err.is_connect() {
                    error!(endpoint = %self.endpoint, "cannot connect to chat endpoint");
                    AgentError::Planner(format!("connection failed: {err}"))
                } else {
                    AgentError::Planner(format!("chat request failed: {err}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, "chat endpoint returned error");
            return Err(AgentError::Planner(format!("HTTP {status}: {text}")));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|err| {
            AgentError::Planner(format!("failed to parse chat response: {err}"))
        })?;

        info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            prompt_tokens = completion
                .usage
                .as_ref()
                .map(|u| u.prompt_tokens)
                .unwrap_or(0),
            completion_tokens = completion
                .usage
                .as_ref()
                .map(|u| u.completion_tokens)
                .unwrap_or(0),
            "chat completion finished"
        );

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .ok_or_else(|| AgentError::Planner("no content in chat response".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_json_object_format() {
        let body = ChatCompletionRequest {
            model: "test-model".to_string(),
            messages: vec![Message {
                role: "system".to_string(),
                content: "plan".to_string(),
            }],
            temperature: Some(0.1),
            max_tokens: Some(800),
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
            stream: Some(false),
        };

        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
        assert!(json.contains("\"temperature\":0.1"));
    }

    #[test]
    fn response_format_is_omitted_when_absent() {
        let body = ChatCompletionRequest {
            model: "test-model".to_string(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            response_format: None,
            stream: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("response_format"));
    }

    #[test]
    fn response_parses_without_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.choices[0].message.as_ref().unwrap().content, "ok");
        assert!(response.usage.is_none());
    }

    #[test]
    fn debug_never_prints_the_api_key() {
        let client = OpenAiChatClient::new(
            "http://localhost:11434".to_string(),
            "test-model".to_string(),
            crate::security::test_secret("sk-super-secret"),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-super-secret"));
    }
}
