//! Platform-authenticator integration.
//!
//! Only the opaque credential id is ever stored; biometric data itself
//! never leaves the platform authenticator.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BiometricError {
    #[error("platform authenticator unavailable")]
    Unavailable,
    #[error("enrollment rejected: {0}")]
    Rejected(String),
}

/// Platform authenticator collaborator (WebAuthn-style).
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Register a new platform credential and return its opaque id.
    async fn create_credential(&self, challenge: &[u8]) -> Result<String, BiometricError>;

    /// Challenge an existing credential.
    async fn get_assertion(&self, challenge: &[u8], credential_id: &str) -> bool;
}

/// Authenticator with a fixed outcome, for tests and platforms without
/// biometric hardware.
pub struct StaticAuthenticator {
    accept: bool,
}

impl StaticAuthenticator {
    pub fn accepting() -> Self {
        Self { accept: true }
    }

    pub fn rejecting() -> Self {
        Self { accept: false }
    }
}

#[async_trait]
impl PlatformAuthenticator for StaticAuthenticator {
    async fn create_credential(&self, challenge: &[u8]) -> Result<String, BiometricError> {
        if self.accept {
            Ok(format!("static-{}", hex::encode(&challenge[..4.min(challenge.len())])))
        } else {
            Err(BiometricError::Rejected("user cancelled".to_string()))
        }
    }

    async fn get_assertion(&self, _challenge: &[u8], _credential_id: &str) -> bool {
        self.accept
    }
}
