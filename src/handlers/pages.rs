use axum::{
    Json,
    extract::{Path, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::middleware::{LooseBody, RequireUser};
use crate::router::GatewayState;
use crate::types::loose::first_bool;
use crate::types::requests::normalize_strength;
use crate::upstream::types::{HandwritingRequest, OcrRequest, OcrResult};

const MISSING_IMAGE: &str =
    "An image is required (multipart pageImage/image/file, or imageBase64/imageUrl)";

/// POST /pages/{page_id}/ocr
pub async fn ocr(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    Path(page_id): Path<String>,
    mut body: LooseBody,
) -> Result<Json<OcrResult>, GatewayError> {
    let image = body
        .take_image()?
        .ok_or_else(|| GatewayError::BadRequest(MISSING_IMAGE.to_string()))?;
    let req = OcrRequest {
        page_id,
        image,
        languages: state.config.upstream.ocr_languages.clone(),
        return_layout: first_bool(&body.fields, &["returnLayout", "return_layout"])
            .unwrap_or(true),
    };
    Ok(Json(state.processing.extract_text(&user.user_id, req).await?))
}

/// POST /pages/{page_id}/remove-handwriting
///
/// A successful run whose cleaned image is a `data:image/...` URI is answered
/// with the decoded bytes; any other upstream result is passed on as JSON.
pub async fn remove_handwriting(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    Path(page_id): Path<String>,
    mut body: LooseBody,
) -> Result<Response, GatewayError> {
    let image = body
        .take_image()?
        .ok_or_else(|| GatewayError::BadRequest(MISSING_IMAGE.to_string()))?;
    let strength = normalize_strength(&body.fields);
    let req = HandwritingRequest {
        page_id: page_id.clone(),
        image,
        strength,
    };
    let result = state
        .processing
        .clean_handwriting(&user.user_id, req)
        .await?;

    let inline = result
        .clean_image_url
        .as_deref()
        .filter(|_| result.status.trim().eq_ignore_ascii_case("success"))
        .filter(|url| url.starts_with("data:image/"))
        .map(decode_data_uri);
    match inline {
        Some(Ok(image)) => {
            debug!(page_id = %page_id, bytes = image.data.len(), "returning cleaned image inline");
            let disposition = format!(
                "inline; filename=\"clean_{}.{}\"",
                filename_safe(&page_id),
                filename_safe(extension_for(&image.mime))
            );
            Ok((
                [(CONTENT_TYPE, image.mime), (CONTENT_DISPOSITION, disposition)],
                image.data,
            )
                .into_response())
        }
        Some(Err(reason)) => {
            warn!(page_id = %page_id, %reason, "cleaned image data URI unreadable; returning JSON");
            Ok(Json(result).into_response())
        }
        None => Ok(Json(result).into_response()),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Decode `data:<mime>;base64,<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<InlineImage, String> {
    let rest = uri.strip_prefix("data:").ok_or("not a data URI")?;
    let (meta, payload) = rest.split_once(',').ok_or("data URI has no payload")?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or("data URI is not base64 encoded")?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    let data = BASE64
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    Ok(InlineImage {
        mime: mime.to_string(),
        data,
    })
}

/// Keep `[A-Za-z0-9_.-]`; anything else becomes `_`.
fn filename_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension_for(mime: &str) -> &str {
    match mime {
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        other => other
            .strip_prefix("image/")
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin"),
    }
}
