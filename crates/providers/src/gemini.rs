//! Google Gemini provider (`generateContent` REST API).
//!
//! The whole prompt is sent as a single user turn; the companion renders its
//! own structure into the prompt text.

use async_trait::async_trait;
use diarist_core::error::ProviderError;
use diarist_core::provider::*;
use serde::Deserialize;
use tracing::debug;
use crate::{error_for_status, http_client, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http_client(),
        }
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut generation = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            generation["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": generation,
        })
    }

    /// Concatenate the text parts of the first candidate.
    fn extract(response: ApiResponse, requested_model: &str) -> Result<ProviderResponse, ProviderError> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            ProviderError::EmptyCompletion(reason)
        })?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion(
                candidate.finish_reason.unwrap_or_else(|| "empty text".into()),
            ));
        }

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            text,
            usage,
            model: response.model_version.unwrap_or_else(|| requested_model.to_string()),
        })
    }
}

#[async_trait]
impl diarist_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "gemini: no API key (set GEMINI_API_KEY or api_key)".into(),
            ));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        debug!(model = %request.model, prompt_len = request.prompt.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status("gemini", status, body));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Self::extract(api_response, &request.model)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    usage_metadata: Option<ApiUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
