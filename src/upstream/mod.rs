//! Client side of the upstream processing service (OCR, handwriting cleanup,
//! PDF extraction, search index, retrieval chat).

pub mod client;
pub mod types;

use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::Value;

use crate::error::GatewayError;
use types::{
    AskRequest, ChatAnswer, HandwritingRequest, HandwritingResult, IndexUpsert, OcrRequest,
    OcrResult, PdfExtraction,
};

pub use client::ProcessingClient;

/// Operations the gateway delegates upstream. Every call is made on behalf of
/// one user.
#[async_trait]
pub trait Processing: Send + Sync {
    async fn extract_text(&self, user_id: &str, req: OcrRequest) -> Result<OcrResult, GatewayError>;

    /// Long running; implementations apply the extended handwriting timeout.
    async fn clean_handwriting(
        &self,
        user_id: &str,
        req: HandwritingRequest,
    ) -> Result<HandwritingResult, GatewayError>;

    async fn extract_pdf_text(&self, user_id: &str, pdf: Bytes)
    -> Result<PdfExtraction, GatewayError>;

    /// Idempotent per `doc_id` when `replace` is set.
    async fn upsert_index(&self, user_id: &str, req: &IndexUpsert) -> Result<Value, GatewayError>;

    async fn delete_index(&self, user_id: &str, doc_id: &str) -> Result<Value, GatewayError>;

    async fn ask_chat(&self, user_id: &str, req: &AskRequest) -> Result<ChatAnswer, GatewayError>;
}
