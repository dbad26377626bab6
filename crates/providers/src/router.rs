//! Provider router: selects the LLM provider based on config.

use std::collections::HashMap;
use std::sync::Arc;
use diarist_core::provider::Provider;
use crate::gemini::{self, GeminiProvider};
use crate::openai_compat::OpenAiCompatProvider;

/// Routes completion requests to the configured provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &diarist_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        router.register(
            name.clone(),
            build_one(name, provider_config.api_url.as_deref(), &api_key),
        );
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        router.register(
            config.default_provider.clone(),
            build_one(&config.default_provider, None, &api_key),
        );
    }

    router
}

fn build_one(name: &str, api_url: Option<&str>, api_key: &str) -> Arc<dyn Provider> {
    if name == "gemini" {
        Arc::new(GeminiProvider::with_base_url(
            api_url.unwrap_or(gemini::DEFAULT_BASE_URL),
            api_key,
        ))
    } else {
        let base_url = api_url.map(str::to_string).unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
    }
}

/// Default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        router.register("openai", Arc::new(OpenAiCompatProvider::new("openai", "https://api.openai.com/v1", "sk-test")));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_config_routes_to_gemini() {
        let router = build_from_config(&diarist_config::AppConfig::default());
        let provider = router.default().unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn configured_providers_are_registered() {
        let mut config = diarist_config::AppConfig {
            default_provider: "ollama".into(),
            ..Default::default()
        };
        config.providers.insert(
            "ollama".into(),
            diarist_config::ProviderConfig {
                api_key: None,
                api_url: Some("http://gpu-box:11434/v1".into()),
                default_model: None,
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["ollama"]);
        assert_eq!(router.default().unwrap().name(), "ollama");
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }
}
