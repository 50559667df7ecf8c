use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::db::models::logical_doc_id;
use crate::error::GatewayError;
use crate::middleware::{LooseBody, RequireUser};
use crate::router::GatewayState;
use crate::service::{DriveStatus, LinkOutcome, SyncReport};

#[derive(Debug, Deserialize)]
pub struct OauthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn status(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<DriveStatus>, GatewayError> {
    Ok(Json(state.drive()?.accounts.status(&user.user_id).await?))
}

/// GET /drive/oauth2/start -> consent URL for the caller; the client opens it
/// in a browser.
pub async fn oauth_start(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, GatewayError> {
    let url = state.drive()?.accounts.start_link(&user.user_id)?;
    Ok(Json(json!({ "url": url.as_str() })))
}

/// GET /drive/oauth2/callback -> public; the user comes from the signed `state`.
pub async fn oauth_callback(
    State(state): State<GatewayState>,
    Query(query): Query<OauthCallbackQuery>,
) -> Result<Json<LinkOutcome>, GatewayError> {
    if let Some(error) = query.error {
        return Err(GatewayError::BadRequest(format!("OAuth consent failed: {error}")));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing code".to_string()))?;
    let link_state = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing state".to_string()))?;

    let outcome = state
        .drive()?
        .accounts
        .complete_link(&code, &link_state)
        .await?;
    Ok(Json(outcome))
}

pub async fn init_folder(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, GatewayError> {
    let folder_id = state
        .drive()?
        .accounts
        .ensure_app_folder(&user.user_id)
        .await?;
    Ok(Json(json!({ "folderId": folder_id })))
}

/// POST /drive/upload -> multipart, one `file` part.
pub async fn upload(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    mut body: LooseBody,
) -> Result<Json<Value>, GatewayError> {
    let drive = state.drive()?;
    let file = body
        .take_file(&["file"])
        .ok_or_else(|| GatewayError::BadRequest("Missing file".to_string()))?;
    let name = file.file_name.unwrap_or_else(|| "upload".to_string());
    let mime = file
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let uploaded = drive
        .accounts
        .upload(&user.user_id, &name, &mime, file.data)
        .await?;
    let doc_id = logical_doc_id(&uploaded.id);
    Ok(Json(json!({ "file": uploaded, "docId": doc_id })))
}

pub async fn sync(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<SyncReport>, GatewayError> {
    Ok(Json(state.drive()?.sync.sync(&user.user_id).await?))
}
