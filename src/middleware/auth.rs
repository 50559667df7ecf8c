use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::auth::{Identity, parse_bearer};
use crate::error::GatewayError;
use crate::router::GatewayState;

/// Caller identity from `Authorization: Bearer <token>`.
///
/// Rejects with 401 when the header is missing or malformed, or when the token
/// fails verification.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Identity);

impl FromRequestParts<GatewayState> for RequireUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &GatewayState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = parse_bearer(header)?;
        let identity = state.verifier.verify(token).await?;
        Ok(Self(identity))
    }
}
