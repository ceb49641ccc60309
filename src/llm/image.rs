//! Image generation client.

use crate::config::ImageConfig;
use crate::error::ApiError;
use crate::llm::{classify_request_error, read_json_response};

use serde::Serialize;
use std::time::Duration;

/// Request body for the image endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub image_size: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub num_images: u32,
    pub enable_safety_checker: bool,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_size: "landscape_4_3".into(),
            num_inference_steps: 4,
            guidance_scale: 3.5,
            num_images: 1,
            enable_safety_checker: true,
        }
    }
}

/// Calls the image endpoint once per request. Generation is expensive, so
/// failures are surfaced instead of retried.
#[derive(Debug, Clone)]
pub struct ImageClient {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl ImageClient {
    pub fn new(http_client: reqwest::Client, config: &ImageConfig) -> Self {
        Self {
            http_client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }

    /// Generate images and return their URLs.
    pub async fn generate(&self, request: &ImageRequest) -> Result<Vec<String>, ApiError> {
        let response = self
            .http_client
            .post(&self.url)
            .header("authorization", format!("Key {}", self.api_key))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let body = read_json_response(response).await?;
        parse_image_urls(&body)
    }
}

/// Accepts `images: [{url}]` as well as bare URL strings.
fn parse_image_urls(body: &serde_json::Value) -> Result<Vec<String>, ApiError> {
    let images = body["images"]
        .as_array()
        .ok_or_else(|| ApiError::MalformedResponse("missing images array".into()))?;

    let urls: Vec<String> = images
        .iter()
        .filter_map(|image| image.as_str().or_else(|| image["url"].as_str()))
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(ApiError::MalformedResponse("no image URLs in response".into()));
    }

    Ok(urls)
}
