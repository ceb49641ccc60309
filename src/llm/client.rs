//! Chat-completion client for OpenAI-compatible providers.

use crate::config::CompletionConfig;
use crate::conversation::Turn;
use crate::error::ApiError;
use crate::llm::{RetryPolicy, classify_request_error, read_json_response};
use crate::persona::GenerationParams;

use serde::Serialize;
use std::time::Duration;

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    temperature: f32,
    max_tokens: u32,
}

/// Issues completion requests against one configured endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(http_client: reqwest::Client, config: &CompletionConfig) -> Self {
        Self {
            http_client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
            retry: config.retry,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Text of the first choice, retrying rate limits and timeouts per policy.
    pub async fn complete(
        &self,
        messages: &[Turn],
        params: GenerationParams,
    ) -> Result<String, ApiError> {
        self.retry
            .run("completion", || self.attempt_completion(messages, params))
            .await
    }

    /// Single request, no retry.
    async fn attempt_completion(
        &self,
        messages: &[Turn],
        params: GenerationParams,
    ) -> Result<String, ApiError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .http_client
            .post(&self.url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let response_body = read_json_response(response).await?;
        parse_completion(&response_body)
    }
}

fn parse_completion(body: &serde_json::Value) -> Result<String, ApiError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            ApiError::MalformedResponse("missing choices[0].message.content".into())
        })?;

    if content.trim().is_empty() {
        return Err(ApiError::MalformedResponse("empty completion".into()));
    }

    Ok(content.to_string())
}
