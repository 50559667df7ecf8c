use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{AuthError, Identity, TokenVerifier};
use crate::error::GatewayError;

/// HS256 signer keyed by the gateway secret.
#[derive(Clone)]
pub struct HmacSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl HmacSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, GatewayError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| GatewayError::Internal(format!("token signing failed: {e}")))
    }

    /// Decode and check signature and `exp`.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        jsonwebtoken::decode::<T>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LoginClaims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    iat: i64,
    exp: i64,
}

/// Verifies (and issues) tokens signed with the gateway's own secret.
#[derive(Clone)]
pub struct LocalTokenVerifier {
    signer: HmacSigner,
}

impl LocalTokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            signer: HmacSigner::new(secret),
        }
    }

    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<String, GatewayError> {
        let now = Utc::now();
        self.signer.sign(&LoginClaims {
            sub: identity.user_id.clone(),
            email: identity.email.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        })
    }
}

#[async_trait]
impl TokenVerifier for LocalTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims: LoginClaims = self
            .signer
            .verify(token)
            .map_err(|_| AuthError::InvalidCredential)?;
        if claims.sub.is_empty() {
            return Err(AuthError::InvalidCredential);
        }
        Ok(Identity {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}
