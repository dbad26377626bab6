//! Identity seam: the authenticated user as an explicit value.
//!
//! Credential verification is owned by an external identity service. The
//! core only needs "credential in, opaque user identifier out"; every other
//! operation then takes the [`UserId`] as a parameter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::AuthError;

/// Opaque, stable identifier issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Verifies a bearer credential and returns the user it belongs to.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(&self, credential: &str) -> std::result::Result<UserId, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_serializes_as_plain_string() {
        let id = UserId::new("uid-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"uid-42\"");
        assert_eq!(id.to_string(), "uid-42");
    }
}
