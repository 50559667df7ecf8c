//! Bearer-token verification.
//!
//! A deployment trusts exactly one issuer, chosen by `auth.strategy`:
//! [`local::LocalTokenVerifier`] for HS256 tokens minted by `/auth/login`, or
//! [`provider::IdentityProviderVerifier`] for tokens from an external identity
//! provider. Handlers only ever see the [`TokenVerifier`] trait.

pub mod local;
pub mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error as ThisError;

use crate::config::{AuthConfig, AuthStrategy};
use crate::error::GatewayError;

/// The caller behind a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "id")]
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingCredential,
    #[error("Invalid or expired token")]
    InvalidCredential,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Build the verifier selected by configuration.
pub fn verifier_from_config(
    cfg: &AuthConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn TokenVerifier>, GatewayError> {
    match cfg.strategy {
        AuthStrategy::Local => Ok(Arc::new(local::LocalTokenVerifier::new(&cfg.jwt_secret))),
        AuthStrategy::IdentityProvider => {
            let audience = cfg.audience.clone().ok_or_else(|| {
                GatewayError::Config("auth.audience is required for identity_provider".into())
            })?;
            Ok(Arc::new(provider::IdentityProviderVerifier::new(
                http,
                cfg.jwks_url.clone(),
                cfg.issuer.clone(),
                audience,
            )))
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let auth = header.ok_or(AuthError::MissingCredential)?.trim();
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingCredential)?;
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}
