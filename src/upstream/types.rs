//! Wire types of the upstream processing service.

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Text of one page, the unit the search index stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

impl PageText {
    pub fn single(text: impl Into<String>) -> Vec<PageText> {
        vec![PageText {
            page_number: 1,
            text: text.into(),
        }]
    }
}

/// Where the upstream should read a page image from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes(Bytes),
    /// Already base64-encoded by the client.
    Base64(String),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub page_id: String,
    pub image: ImageSource,
    pub languages: Vec<String>,
    pub return_layout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandwritingStrength {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for HandwritingStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("Invalid strength '{other}' (expected low|medium|high)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandwritingRequest {
    pub page_id: String,
    pub image: ImageSource,
    pub strength: HandwritingStrength,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandwritingResult {
    #[serde(default)]
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfExtraction {
    #[serde(default)]
    pub pages: Vec<PageText>,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexUpsert {
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub replace: bool,
    pub pages: Vec<PageText>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Auto,
    Doc,
    #[default]
    General,
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChatMode::Auto => "auto",
            ChatMode::Doc => "doc",
            ChatMode::General => "general",
        })
    }
}

impl FromStr for ChatMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "doc" => Ok(Self::Doc),
            "general" => Ok(Self::General),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryItem {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    pub mode: ChatMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ChatHistoryItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Value>,
    #[serde(default)]
    pub used_chunks: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
