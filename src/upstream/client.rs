use async_trait::async_trait;
use axum::body::Bytes;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::Processing;
use super::types::{
    AskRequest, ChatAnswer, HandwritingRequest, HandwritingResult, ImageSource, IndexUpsert,
    OcrRequest, OcrResult, PdfExtraction,
};
use crate::config::UpstreamConfig;
use crate::error::GatewayError;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";
pub const USER_ID_HEADER: &str = "x-user-id";

/// One HTTP client bound to the processing service's base URL. The shared
/// secret rides on every request as a default header.
#[derive(Clone)]
pub struct ProcessingClient {
    http: reqwest::Client,
    base_url: Url,
    handwriting_timeout: Duration,
}

impl ProcessingClient {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, GatewayError> {
        let mut token = HeaderValue::from_str(&cfg.internal_token).map_err(|_| {
            GatewayError::Config("upstream.internal_token is not a valid header".into())
        })?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_TOKEN_HEADER, token);

        let http = reqwest::Client::builder()
            .user_agent("docscan-gateway/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .build()?;

        // `Url::join` replaces the last segment unless the base ends with '/'.
        let mut base_url = cfg.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            handwriting_timeout: Duration::from_secs(cfg.handwriting_timeout_secs),
        })
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        user_id: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        let mut req = self.http.post(url).header(USER_ID_HEADER, user_id).json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let raw = resp.bytes().await.unwrap_or_default();
            let body = serde_json::from_slice::<Value>(&raw)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&raw).into_owned()));
            warn!(path, status = %status, "upstream rejected request");
            return Err(GatewayError::Upstream { status, body });
        }
        debug!(path, status = %status, "upstream call ok");
        Ok(resp.json::<T>().await?)
    }
}

fn image_fields(image: &ImageSource) -> (Option<String>, Option<String>) {
    match image {
        ImageSource::Bytes(bytes) => (Some(BASE64.encode(bytes)), None),
        ImageSource::Base64(b64) => (Some(b64.clone()), None),
        ImageSource::Url(url) => (None, Some(url.clone())),
    }
}

#[async_trait]
impl Processing for ProcessingClient {
    async fn extract_text(
        &self,
        user_id: &str,
        req: OcrRequest,
    ) -> Result<OcrResult, GatewayError> {
        let (image_base64, image_url) = image_fields(&req.image);
        let payload = json!({
            "jobId": format!("job_{}", req.page_id),
            "pageId": req.page_id,
            "imageBase64": image_base64,
            "imageUrl": image_url,
            "options": {
                "languages": req.languages,
                "returnLayout": req.return_layout,
            },
        });
        self.post_json("internal/ocr", user_id, &payload, None).await
    }

    async fn clean_handwriting(
        &self,
        user_id: &str,
        req: HandwritingRequest,
    ) -> Result<HandwritingResult, GatewayError> {
        let (image_base64, image_url) = image_fields(&req.image);
        let payload = json!({
            "jobId": format!("hw_{}", req.page_id),
            "pageId": req.page_id,
            "imageBase64": image_base64,
            "imageUrl": image_url,
            "options": { "strength": req.strength },
        });
        self.post_json(
            "internal/remove-handwriting",
            user_id,
            &payload,
            Some(self.handwriting_timeout),
        )
        .await
    }

    async fn extract_pdf_text(
        &self,
        user_id: &str,
        pdf: Bytes,
    ) -> Result<PdfExtraction, GatewayError> {
        let payload = json!({ "fileBase64": BASE64.encode(&pdf) });
        self.post_json("internal/extract/pdf", user_id, &payload, None)
            .await
    }

    async fn upsert_index(&self, user_id: &str, req: &IndexUpsert) -> Result<Value, GatewayError> {
        self.post_json("internal/index/upsert_ocr", user_id, req, None)
            .await
    }

    async fn delete_index(&self, user_id: &str, doc_id: &str) -> Result<Value, GatewayError> {
        self.post_json(
            "internal/index/delete_doc",
            user_id,
            &json!({ "doc_id": doc_id }),
            None,
        )
        .await
    }

    async fn ask_chat(&self, user_id: &str, req: &AskRequest) -> Result<ChatAnswer, GatewayError> {
        self.post_json("internal/chat/ask", user_id, req, None).await
    }
}
