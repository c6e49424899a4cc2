use crate::config;

use jwt_simple::algorithms::MACLike;
use jwt_simple::prelude::{HS256Key, VerificationOptions};
use serde::{Deserialize, Serialize};

pub const SERVICE_ROLE: &str = "service_role";

/// Verifies bearer tokens minted by the hosted auth service.
#[derive(Debug, Clone)]
pub struct AuthState {
    key: HS256Key,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid auth secret")]
    InvalidKey,
    #[error("invalid auth token")]
    InvalidToken,
    #[error("auth token missing expiry")]
    MissingExpiry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The verified identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: Option<String>,
    pub role: Option<String>,
}

impl Caller {
    /// Used when auth is not configured: every request acts with full rights.
    pub fn unrestricted() -> Self {
        Self {
            subject: None,
            role: Some(SERVICE_ROLE.to_string()),
        }
    }

    pub fn is_service(&self) -> bool {
        self.role.as_deref() == Some(SERVICE_ROLE)
    }

    pub fn may_act_for(&self, user_id: &str) -> bool {
        self.is_service() || self.subject.as_deref() == Some(user_id)
    }
}

impl AuthState {
    pub fn from_config(config: &config::AppConfig) -> Result<Option<Self>, AuthError> {
        let Some(auth) = config.auth.as_ref() else {
            return Ok(None);
        };
        let secret = auth.secret.trim();
        if secret.is_empty() {
            return Err(AuthError::InvalidKey);
        }
        Ok(Some(Self {
            key: HS256Key::from_bytes(secret.as_bytes()),
        }))
    }

    pub fn verify_token(&self, token: &str) -> Result<Caller, AuthError> {
        let claims = self
            .key
            .verify_token::<RoleClaims>(token, Some(VerificationOptions::default()))
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.expires_at.is_none() {
            return Err(AuthError::MissingExpiry);
        }

        Ok(Caller {
            subject: claims.subject.filter(|subject| !subject.trim().is_empty()),
            role: claims.custom.role,
        })
    }
}
