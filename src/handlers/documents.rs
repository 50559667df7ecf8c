use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::middleware::{LooseBody, RequireUser};
use crate::router::GatewayState;
use crate::types::loose::first_str;

pub async fn create(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    body: LooseBody,
) -> Result<(StatusCode, Json<Value>), GatewayError> {
    let title = first_str(&body.fields, &["title"])
        .ok_or_else(|| GatewayError::BadRequest("Missing title".to_string()))?;
    let document = state.documents.create(&user.user_id, &title).await?;
    Ok((StatusCode::CREATED, Json(json!({ "document": document }))))
}

pub async fn list(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, GatewayError> {
    let documents = state.documents.list(&user.user_id).await?;
    Ok(Json(json!({ "documents": documents })))
}

pub async fn get(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let document = state
        .documents
        .get(&user.user_id, &id)
        .await?
        .ok_or_else(|| GatewayError::NotFound("Document not found".to_string()))?;
    Ok(Json(json!({ "document": document })))
}
