//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Groq, and any endpoint that
//! exposes `/v1/chat/completions`. The rendered prompt is sent as one user
//! message.

use async_trait::async_trait;
use diarist_core::error::ProviderError;
use diarist_core::provider::*;
use serde::Deserialize;
use tracing::debug;
use crate::{error_for_status, http_client, transport_error};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http_client(),
        }
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    fn extract(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyCompletion("No choices in response".into()))?;

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion(
                choice.finish_reason.unwrap_or_else(|| "empty content".into()),
            ));
        }

        Ok(ProviderResponse {
            text,
            usage: api_response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: api_response.model,
        })
    }
}

#[async_trait]
impl diarist_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(&self.name, status, body));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Self::extract(api_response)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use diarist_core::Provider;
    use serde_json::json;

    #[test]
    fn base_url_loses_trailing_slash() {
        let provider = OpenAiCompatProvider::new("ollama", "http://localhost:11434/v1/", "ollama");
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn prompt_is_a_single_user_message() {
        let body = OpenAiCompatProvider::request_body(&ProviderRequest::new("gpt-4o-mini", "hello"));
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn extract_reads_first_choice() {
        let api: ApiResponse = serde_json::from_value(json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Hey"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }))
        .unwrap();
        let resp = OpenAiCompatProvider::extract(api).unwrap();
        assert_eq!(resp.text, "Hey");
        assert_eq!(resp.usage.unwrap().prompt_tokens, 3);
    }

    #[test]
    fn empty_choices_are_an_error() {
        let api: ApiResponse = serde_json::from_value(json!({"model": "m", "choices": []})).unwrap();
        assert!(matches!(
            OpenAiCompatProvider::extract(api),
            Err(ProviderError::EmptyCompletion(_))
        ));
    }
}
