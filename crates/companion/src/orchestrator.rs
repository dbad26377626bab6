//! The conversation pipeline for one user turn.
//!
//! ```text
//! Received → ContextGathered → PromptBuilt → ModelInvoked → Persisted → Responded
//!     │                                          │              │
//!     └─ Rejected (empty message)                └─ ModelFailed └─ PersistFailed → Responded
//! ```
//!
//! `Rejected` and `ModelFailed` end the turn with an error. A failed write of
//! the exchange is logged and the reply is still returned.

use crate::context::{ContextAssembler, ContextSource};
use crate::prompt::PromptComposer;
use chrono::Utc;
use diarist_config::{AppConfig, CompanionConfig};
use diarist_core::auth::UserId;
use diarist_core::chat::ChatExchange;
use diarist_core::error::{Error, Result};
use diarist_core::persona::{Persona, PersonaLibrary};
use diarist_core::provider::{Provider, ProviderRequest};
use diarist_store::HistoryStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a turn is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    ContextGathered,
    PromptBuilt,
    ModelInvoked,
    Persisted,
    Responded,
    Rejected,
    ModelFailed,
    PersistFailed,
}

/// Model parameters for companion replies.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub(crate) fn request(&self, prompt: String) -> ProviderRequest {
        let request = ProviderRequest::new(self.model.clone(), prompt).with_temperature(self.temperature);
        match self.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }
}

impl From<&AppConfig> for ModelSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        }
    }
}

/// Minimum time a turn takes before the reply is returned. Short messages
/// wait longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseDelay {
    pub short_message_chars: usize,
    pub short: Duration,
    pub long: Duration,
}

impl Default for ResponseDelay {
    fn default() -> Self {
        Self {
            short_message_chars: 10,
            short: Duration::from_secs(2),
            long: Duration::from_secs(1),
        }
    }
}

impl From<&CompanionConfig> for ResponseDelay {
    fn from(config: &CompanionConfig) -> Self {
        Self {
            short_message_chars: config.short_message_chars,
            short: Duration::from_millis(config.short_delay_ms),
            long: Duration::from_millis(config.long_delay_ms),
        }
    }
}

impl ResponseDelay {
    pub fn none() -> Self {
        Self {
            short_message_chars: 0,
            short: Duration::ZERO,
            long: Duration::ZERO,
        }
    }

    pub fn for_message(&self, message: &str) -> Duration {
        if message.trim().chars().count() <= self.short_message_chars {
            self.short
        } else {
            self.long
        }
    }
}

/// A completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub persona: Persona,
    pub response: String,
    /// Whether the exchange reached the history store.
    pub persisted: bool,
    /// Context sources that were unavailable for this turn.
    pub degraded: Vec<ContextSource>,
    /// Stages the turn passed through, in order.
    pub stages: Vec<Stage>,
}

/// Runs conversation turns. Shared across requests behind an `Arc`.
pub struct Conversation {
    assembler: ContextAssembler,
    composer: PromptComposer,
    history: HistoryStore,
    personas: Arc<PersonaLibrary>,
    provider: Arc<dyn Provider>,
    model: ModelSettings,
    delay: ResponseDelay,
}

impl Conversation {
    pub fn new(
        assembler: ContextAssembler,
        history: HistoryStore,
        personas: Arc<PersonaLibrary>,
        provider: Arc<dyn Provider>,
        model: ModelSettings,
    ) -> Self {
        let composer = PromptComposer::new(assembler.window().entry_days);
        Self {
            assembler,
            composer,
            history,
            personas,
            provider,
            model,
            delay: ResponseDelay::default(),
        }
    }

    pub fn with_delay(mut self, delay: ResponseDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Run one turn for `persona`.
    ///
    /// Context, identity and history all come from `persona`'s partition
    /// only. The model is called at most once.
    pub async fn handle(
        &self,
        user: &UserId,
        persona: Persona,
        message: &str,
        thread_id: Option<String>,
        context_hint: Option<&str>,
    ) -> Result<Reply> {
        let started = Instant::now();
        let received_at = Utc::now();
        let mut stages = vec![Stage::Received];

        if message.trim().is_empty() {
            debug!(user = %user, persona = %persona, stage = ?Stage::Rejected, "Empty message");
            return Err(Error::validation("message must not be empty"));
        }

        let ctx = self.assembler.assemble(user, persona, context_hint).await;
        stages.push(Stage::ContextGathered);

        let identity = self.personas.get(persona);
        let prompt = self.composer.compose(persona, &identity, &ctx, message);
        stages.push(Stage::PromptBuilt);
        debug!(user = %user, persona = %persona, prompt_chars = prompt.len(), "Prompt built");

        let response = match self.provider.complete(self.model.request(prompt)).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    user = %user,
                    persona = %persona,
                    provider = self.provider.name(),
                    stage = ?Stage::ModelFailed,
                    error = %e,
                    "Model invocation failed"
                );
                return Err(e.into());
            }
        };
        stages.push(Stage::ModelInvoked);

        let exchange = ChatExchange::user(message, thread_id)
            .at(received_at)
            .with_response(response.text.clone());
        let persisted = match self.history.append(user, persona, &exchange).await {
            Ok(_) => {
                stages.push(Stage::Persisted);
                true
            }
            Err(e) => {
                warn!(user = %user, persona = %persona, error = %e, "Failed to save exchange, replying anyway");
                stages.push(Stage::PersistFailed);
                false
            }
        };

        let floor = self.delay.for_message(message);
        let elapsed = started.elapsed();
        if floor > elapsed {
            tokio::time::sleep(floor - elapsed).await;
        }
        stages.push(Stage::Responded);

        info!(
            user = %user,
            persona = %persona,
            response_chars = response.text.len(),
            persisted,
            degraded = ctx.degraded.len(),
            "Turn complete"
        );

        Ok(Reply {
            persona,
            response: response.text,
            persisted,
            degraded: ctx.degraded.iter().map(|d| d.source).collect(),
            stages,
        })
    }
}
