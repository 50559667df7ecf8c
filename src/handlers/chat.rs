use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::middleware::{LooseBody, RequireUser};
use crate::router::GatewayState;
use crate::types::requests::normalize_ask;

/// POST /chat/ask -> same request rules as `/ai/chat/ask`, answered in the
/// mobile client's `{response, error}` shape.
pub async fn ask(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    body: LooseBody,
) -> Result<Json<Value>, GatewayError> {
    let req = normalize_ask(&body.fields, state.config.chat.default_mode)?;
    let answer = state.processing.ask_chat(&user.user_id, &req).await?;
    Ok(Json(json!({
        "response": answer.answer,
        "error": null,
        "citations": answer.citations,
        "used_chunks": answer.used_chunks,
    })))
}
