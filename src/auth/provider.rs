use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::{AuthError, Identity, TokenVerifier};

const JWKS_TTL: Duration = Duration::from_secs(60 * 60);
/// Floor between refetches forced by an unknown `kid`.
const FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ProviderClaims {
    sub: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies RS256 ID tokens from an external identity provider.
///
/// Signing keys come from the provider's JWKS endpoint and are cached for an
/// hour; an unknown `kid` forces one refetch.
pub struct IdentityProviderVerifier {
    http: reqwest::Client,
    jwks_url: Url,
    issuer: String,
    audience: String,
    cache: RwLock<Option<CachedJwks>>,
}

impl IdentityProviderVerifier {
    /// When `issuer` is not configured, Firebase's convention
    /// `https://securetoken.google.com/<audience>` is assumed.
    pub fn new(
        http: reqwest::Client,
        jwks_url: Url,
        issuer: Option<String>,
        audience: String,
    ) -> Self {
        let issuer =
            issuer.unwrap_or_else(|| format!("https://securetoken.google.com/{audience}"));
        Self {
            http,
            jwks_url,
            issuer,
            audience,
            cache: RwLock::new(None),
        }
    }

    async fn fetch_jwks(&self, force: bool) -> Result<JwkSet, AuthError> {
        {
            let fresh_for = if force { FORCED_REFRESH_INTERVAL } else { JWKS_TTL };
            let cache = self.cache.read().await;
            if let Some(c) = cache.as_ref()
                && c.fetched_at.elapsed() < fresh_for
            {
                return Ok(c.keys.clone());
            }
        }

        let keys: JwkSet = self
            .http
            .get(self.jwks_url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(error = %e, "failed to fetch identity provider JWKS");
                AuthError::InvalidCredential
            })?
            .json()
            .await
            .map_err(|e| {
                warn!(error = %e, "identity provider JWKS was not valid JSON");
                AuthError::InvalidCredential
            })?;
        debug!(count = keys.keys.len(), "refreshed identity provider JWKS");

        *self.cache.write().await = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let jwks = self.fetch_jwks(false).await?;
        let jwk = match jwks.find(kid) {
            Some(jwk) => jwk.clone(),
            None => self
                .fetch_jwks(true)
                .await?
                .find(kid)
                .cloned()
                .ok_or(AuthError::InvalidCredential)?,
        };
        DecodingKey::from_jwk(&jwk).map_err(|_| AuthError::InvalidCredential)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation
    }
}

#[async_trait]
impl TokenVerifier for IdentityProviderVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::InvalidCredential)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidCredential);
        }
        let kid = header.kid.ok_or(AuthError::InvalidCredential)?;
        let key = self.decoding_key(&kid).await?;
        let claims = jsonwebtoken::decode::<ProviderClaims>(token, &key, &self.validation())
            .map_err(|_| AuthError::InvalidCredential)?
            .claims;

        let user_id = claims
            .user_id
            .filter(|s| !s.is_empty())
            .unwrap_or(claims.sub);
        if user_id.is_empty() {
            return Err(AuthError::InvalidCredential);
        }
        Ok(Identity {
            user_id,
            email: claims.email,
        })
    }
}
