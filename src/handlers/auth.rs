use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use crate::auth::Identity;
use crate::error::GatewayError;
use crate::middleware::{LooseBody, RequireUser};
use crate::router::GatewayState;
use crate::types::loose::first_str;

const DEMO_EMAIL: &str = "demo@example.com";

/// POST /auth/login -> demo login: any credentials yield a token for the
/// configured demo user.
pub async fn login(
    State(state): State<GatewayState>,
    body: LooseBody,
) -> Result<Json<Value>, GatewayError> {
    let Some(issuer) = state.local_tokens.as_ref() else {
        return Err(GatewayError::NotFound(
            "Local login is disabled; sign in with the identity provider".to_string(),
        ));
    };

    let identity = Identity {
        user_id: state.config.auth.demo_user_id.clone(),
        email: Some(first_str(&body.fields, &["email"]).unwrap_or_else(|| DEMO_EMAIL.to_string())),
    };
    let ttl = chrono::Duration::hours(state.config.auth.token_ttl_hours);
    let token = issuer.issue(&identity, ttl)?;

    info!(user_id = %identity.user_id, "issued local login token");
    Ok(Json(json!({ "user": identity, "accessToken": token })))
}

/// GET /auth/me
pub async fn me(RequireUser(identity): RequireUser) -> Json<Value> {
    Json(json!({ "user": identity }))
}
