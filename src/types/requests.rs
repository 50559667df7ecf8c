use serde_json::{Map, Value};

use super::loose::{embedded_object, first_array, first_bool, first_f64, first_str, first_u32};
use crate::error::GatewayError;
use crate::upstream::types::{
    AskRequest, ChatHistoryItem, ChatMode, ChatRole, HandwritingStrength, ImageSource,
    IndexUpsert, PageText,
};

pub const MISSING_QUESTION: &str = "Missing question (or prompt/history)";
pub const MISSING_DOC_ID: &str = "Missing doc_id";

/// Map any client role label onto the upstream vocabulary.
///
/// `user` and `system` are kept; everything else (`assistant`, `model`, `bot`,
/// unknown labels) is treated as the assistant side of the conversation.
pub fn normalize_role(role: &str) -> ChatRole {
    match role.trim().to_ascii_lowercase().as_str() {
        "user" => ChatRole::User,
        "system" => ChatRole::System,
        _ => ChatRole::Assistant,
    }
}

/// Normalize `history`: items need a role and `text` (or `content`); blank
/// messages are dropped.
pub fn normalize_history(items: &[Value]) -> Vec<ChatHistoryItem> {
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let text = first_str(item, &["text", "content"])?;
            let role = item.get("role").and_then(Value::as_str).unwrap_or("");
            Some(ChatHistoryItem {
                role: normalize_role(role),
                text,
            })
        })
        .collect()
}

/// Build the upstream chat request.
///
/// Precedence: `question` → `prompt` → last user message in `history`;
/// `doc_ids` → `docIds`; `top_k` → `topK`; `min_score` → `minScore`.
/// Without an explicit valid `mode`, `doc` is used when doc ids are present and
/// `default_mode` otherwise.
pub fn normalize_ask(
    body: &Map<String, Value>,
    default_mode: ChatMode,
) -> Result<AskRequest, GatewayError> {
    let history = first_array(body, &["history"])
        .map(|items| normalize_history(&items))
        .unwrap_or_default();

    let question = first_str(body, &["question", "prompt"])
        .or_else(|| {
            history
                .iter()
                .rev()
                .find(|item| item.role == ChatRole::User)
                .map(|item| item.text.clone())
        })
        .ok_or_else(|| GatewayError::BadRequest(MISSING_QUESTION.to_string()))?;

    let doc_ids: Vec<String> = first_array(body, &["doc_ids", "docIds"])
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::trim).map(str::to_string))
        .filter(|s| !s.is_empty())
        .collect();

    let explicit_mode = body
        .get("mode")
        .and_then(Value::as_str)
        .and_then(|m| m.parse::<ChatMode>().ok());
    let mode = match explicit_mode {
        Some(mode) => mode,
        None if !doc_ids.is_empty() => ChatMode::Doc,
        None => default_mode,
    };

    Ok(AskRequest {
        question,
        doc_ids: (!doc_ids.is_empty()).then_some(doc_ids),
        top_k: first_u32(body, &["top_k", "topK"]),
        mode,
        history: (!history.is_empty()).then_some(history),
        min_score: first_f64(body, &["min_score", "minScore"]),
    })
}

pub fn require_doc_id(body: &Map<String, Value>) -> Result<String, GatewayError> {
    first_str(body, &["doc_id", "docId"])
        .map(|s| s.trim().to_string())
        .ok_or_else(|| GatewayError::BadRequest(MISSING_DOC_ID.to_string()))
}

/// `strength` → `hwStrength` → `options.strength` → `medium`. The first
/// value found decides; anything but `low` or `high` means `medium`.
pub fn normalize_strength(body: &Map<String, Value>) -> HandwritingStrength {
    first_str(body, &["strength", "hwStrength"])
        .or_else(|| {
            embedded_object(body, "options").and_then(|opts| first_str(&opts, &["strength"]))
        })
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Image reference carried in a JSON body: `imageBase64` wins over `imageUrl`.
pub fn image_from_fields(body: &Map<String, Value>) -> Option<ImageSource> {
    first_str(body, &["imageBase64", "image_base64"])
        .map(ImageSource::Base64)
        .or_else(|| first_str(body, &["imageUrl", "image_url"]).map(ImageSource::Url))
}

/// Body of `POST /ai/index/upsert-ocr`. `replace` defaults to `true`.
pub fn normalize_index_upsert(body: &Map<String, Value>) -> Result<IndexUpsert, GatewayError> {
    let doc_id = require_doc_id(body)?;
    let pages = first_array(body, &["pages"])
        .ok_or_else(|| GatewayError::BadRequest("Missing pages".to_string()))?
        .into_iter()
        .enumerate()
        .map(|(i, page)| {
            let obj = page.as_object().ok_or_else(|| {
                GatewayError::BadRequest(format!("pages[{i}] must be an object"))
            })?;
            Ok(PageText {
                page_number: first_u32(obj, &["page_number", "pageNumber"])
                    .unwrap_or(i as u32 + 1),
                text: obj
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    Ok(IndexUpsert {
        doc_id,
        title: first_str(body, &["title"]),
        replace: first_bool(body, &["replace"]).unwrap_or(true),
        pages,
    })
}
