//! Signed OAuth `state`: `{uid, nonce}` under the gateway secret, valid ten minutes.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::local::HmacSigner;
use crate::error::GatewayError;

pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    uid: String,
    nonce: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct StateSigner {
    signer: HmacSigner,
}

impl StateSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            signer: HmacSigner::new(secret),
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, GatewayError> {
        let now = Utc::now();
        self.signer.sign(&StateClaims {
            uid: user_id.to_string(),
            nonce: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(STATE_TTL_MINUTES)).timestamp(),
        })
    }

    /// Recover the user id; any signature, expiry or shape problem is `InvalidState`.
    pub fn verify(&self, state: &str) -> Result<String, GatewayError> {
        let claims: StateClaims = self
            .signer
            .verify(state)
            .map_err(|e| GatewayError::InvalidState(e.to_string()))?;
        if claims.uid.is_empty() {
            return Err(GatewayError::InvalidState("missing uid".into()));
        }
        Ok(claims.uid)
    }
}
