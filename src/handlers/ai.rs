use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use crate::error::GatewayError;
use crate::middleware::{LooseBody, RequireUser};
use crate::router::GatewayState;
use crate::types::loose::{first_bool, first_str};
use crate::types::requests::{normalize_ask, normalize_index_upsert, require_doc_id};
use crate::upstream::types::{ChatAnswer, IndexUpsert, PageText};

/// POST /ai/index/upsert-ocr -> already extracted pages into the search index.
pub async fn upsert_ocr(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    body: LooseBody,
) -> Result<Json<Value>, GatewayError> {
    let req = normalize_index_upsert(&body.fields)?;
    Ok(Json(state.processing.upsert_index(&user.user_id, &req).await?))
}

/// POST /ai/index/upsert-pdf -> multipart `file` (PDF) plus `doc_id` and an
/// optional `title`. Text is extracted upstream, then indexed page by page.
pub async fn upsert_pdf(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    mut body: LooseBody,
) -> Result<Json<Value>, GatewayError> {
    let doc_id = require_doc_id(&body.fields)?;
    let file = body
        .take_file(&["file"])
        .ok_or_else(|| GatewayError::BadRequest("Missing file".to_string()))?;

    let extracted = state
        .processing
        .extract_pdf_text(&user.user_id, file.data)
        .await?;
    let pages = if extracted.pages.is_empty() {
        PageText::single("")
    } else {
        extracted.pages
    };
    let page_count = pages.len();

    let req = IndexUpsert {
        doc_id: doc_id.clone(),
        title: first_str(&body.fields, &["title"]).or(file.file_name),
        replace: first_bool(&body.fields, &["replace"]).unwrap_or(true),
        pages,
    };
    let index = state.processing.upsert_index(&user.user_id, &req).await?;
    info!(user_id = %user.user_id, doc_id = %doc_id, pages = page_count, "indexed PDF");

    Ok(Json(json!({
        "doc_id": doc_id,
        "total_pages": extracted.total_pages,
        "pages": page_count,
        "index": index,
    })))
}

pub async fn delete(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    body: LooseBody,
) -> Result<Json<Value>, GatewayError> {
    let doc_id = require_doc_id(&body.fields)?;
    Ok(Json(state.processing.delete_index(&user.user_id, &doc_id).await?))
}

/// POST /ai/chat/ask
pub async fn ask(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    body: LooseBody,
) -> Result<Json<ChatAnswer>, GatewayError> {
    let req = normalize_ask(&body.fields, state.config.chat.default_mode)?;
    Ok(Json(state.processing.ask_chat(&user.user_id, &req).await?))
}
