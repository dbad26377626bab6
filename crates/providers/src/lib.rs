//! LLM Provider implementations for Diarist.
//!
//! All providers implement the `diarist_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};

use diarist_core::error::ProviderError;
use tracing::warn;

/// Shared HTTP client settings for every provider.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}

/// Map a non-success HTTP status to a provider error.
pub(crate) fn error_for_status(provider: &str, status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_secs: 5 },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        404 => ProviderError::ModelNotFound(body),
        408 | 504 => ProviderError::Timeout(format!("{provider} returned {status}")),
        _ => {
            warn!(provider, status, body = %body, "Provider returned error");
            ProviderError::ApiError {
                status_code: status,
                message: body,
            }
        }
    }
}

/// Map a transport failure to a provider error.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}
