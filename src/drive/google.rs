use async_trait::async_trait;
use axum::body::Bytes;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{DriveConnector, DriveFile, DriveFilePage, DriveFiles, FOLDER_MIME};
use crate::config::DriveConfig;
use crate::error::GatewayError;
use crate::google_oauth::OauthFlow;

const LIST_FIELDS: &str = "nextPageToken, files(id,name,mimeType,modifiedTime,md5Checksum,size)";
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,md5Checksum";
const UPLOAD_BOUNDARY: &str = "docscan-gateway-upload-boundary";

/// Builds per-user [`GoogleDrive`] handles. One rate limiter is shared by all
/// of them so the process as a whole stays within the Drive quota.
pub struct GoogleDriveConnector {
    oauth: Arc<dyn OauthFlow>,
    http: reqwest::Client,
    api_base: Url,
    upload_base: Url,
    page_size: u32,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl GoogleDriveConnector {
    pub fn new(oauth: Arc<dyn OauthFlow>, cfg: &DriveConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent("docscan-gateway/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()?;
        let rps = NonZeroU32::new(cfg.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            oauth,
            http,
            api_base: cfg.api_base.clone(),
            upload_base: cfg.upload_base.clone(),
            page_size: cfg.page_size.max(1),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }
}

#[async_trait]
impl DriveConnector for GoogleDriveConnector {
    async fn connect(&self, refresh_token: &str) -> Result<Arc<dyn DriveFiles>, GatewayError> {
        let access_token = self.oauth.access_token(refresh_token).await?;
        Ok(Arc::new(GoogleDrive {
            http: self.http.clone(),
            access_token,
            api_base: self.api_base.clone(),
            upload_base: self.upload_base.clone(),
            page_size: self.page_size,
            limiter: self.limiter.clone(),
        }))
    }
}

/// Drive v3 REST client acting for one user.
pub struct GoogleDrive {
    http: reqwest::Client,
    access_token: String,
    api_base: Url,
    upload_base: Url,
    page_size: u32,
    limiter: Arc<DefaultDirectRateLimiter>,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FolderRef>,
}

#[derive(Deserialize)]
struct FolderRef {
    id: String,
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl GoogleDrive {
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        self.limiter.until_ready().await;
        let resp = req.bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        warn!(status = %status, "Drive API call failed");
        Err(GatewayError::Drive { status, message })
    }

    fn files_url(&self, suffix: &str) -> Result<Url, GatewayError> {
        Ok(self.api_base.join(&format!("files{suffix}"))?)
    }
}

#[async_trait]
impl DriveFiles for GoogleDrive {
    async fn find_folder(&self, name: &str) -> Result<Option<String>, GatewayError> {
        let q = format!(
            "mimeType='{FOLDER_MIME}' and name='{}' and trashed=false",
            escape_query_value(name)
        );
        let req = self.http.get(self.files_url("")?).query(&[
            ("q", q.as_str()),
            ("fields", "files(id,name)"),
            ("pageSize", "5"),
        ]);
        let list: FileList = self.send(req).await?.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, name: &str) -> Result<String, GatewayError> {
        let req = self
            .http
            .post(self.files_url("")?)
            .query(&[("fields", "id,name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME }));
        let created: FolderRef = self.send(req).await?.json().await?;
        debug!(folder_id = %created.id, "created Drive folder");
        Ok(created.id)
    }

    async fn list_folder(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<DriveFilePage, GatewayError> {
        let q = format!("'{}' in parents and trashed=false", escape_query_value(folder_id));
        let page_size = self.page_size.to_string();
        let mut params = vec![
            ("q", q.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let req = self.http.get(self.files_url("")?).query(&params);
        Ok(self.send(req).await?.json().await?)
    }

    async fn export_text(&self, file_id: &str, export_mime: &str) -> Result<String, GatewayError> {
        let req = self
            .http
            .get(self.files_url(&format!("/{file_id}/export"))?)
            .query(&[("mimeType", export_mime)]);
        Ok(self.send(req).await?.text().await?)
    }

    async fn download(&self, file_id: &str) -> Result<Bytes, GatewayError> {
        let req = self
            .http
            .get(self.files_url(&format!("/{file_id}"))?)
            .query(&[("alt", "media")]);
        Ok(self.send(req).await?.bytes().await?)
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<DriveFile, GatewayError> {
        let metadata = json!({ "name": name, "parents": [folder_id] });
        let body = multipart_related(&metadata.to_string(), mime_type, &data);
        let req = self
            .http
            .post(self.upload_base.join("files")?)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={UPLOAD_BOUNDARY}"),
            )
            .body(body);
        Ok(self.send(req).await?.json().await?)
    }
}

/// Body of a Drive `uploadType=multipart` request: JSON metadata part, then media.
fn multipart_related(metadata_json: &str, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);
    body.extend_from_slice(
        format!(
            "--{UPLOAD_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata_json}\r\n--{UPLOAD_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{UPLOAD_BOUNDARY}--\r\n").as_bytes());
    body
}
