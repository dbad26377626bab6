//! Bearer-credential authentication.
//!
//! Every route except `/health` runs behind [`auth_middleware`], which hands
//! the resolved [`UserId`] to handlers as a request extension.

use crate::SharedState;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use diarist_config::AuthConfig;
use diarist_core::auth::{IdentityVerifier, UserId};
use diarist_core::error::AuthError;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Verifies credentials against a fixed `credential → user` table.
#[derive(Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: impl IntoIterator<Item = (String, UserId)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config
                .tokens
                .iter()
                .map(|(token, user)| (token.clone(), UserId::new(user.clone()))),
        )
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    fn name(&self) -> &str {
        "static"
    }

    async fn verify(&self, credential: &str) -> Result<UserId, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}

/// Resolve `Authorization: Bearer <credential>` to a [`UserId`].
pub async fn auth_middleware(State(state): State<SharedState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let credential = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredential)?;

    let user = match state.verifier.verify(credential).await {
        Ok(user) => user,
        Err(e) => {
            warn!(path = %req.uri().path(), verifier = state.verifier.name(), "Rejected credential");
            return Err(e.into());
        }
    };
    debug!(user = %user, path = %req.uri().path(), "Authenticated");

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
