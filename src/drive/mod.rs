//! Google Drive access.
//!
//! [`DriveFiles`] is the narrow slice of the Drive v3 files API the gateway
//! needs; [`DriveConnector`] turns a stored refresh token into a live handle.
//! The reqwest implementation lives in [`google`].

pub mod google;
pub mod mime;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GatewayError;

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFilePage {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait DriveFiles: Send + Sync {
    /// Id of a non-trashed folder with exactly this name, if any.
    async fn find_folder(&self, name: &str) -> Result<Option<String>, GatewayError>;

    async fn create_folder(&self, name: &str) -> Result<String, GatewayError>;

    /// Non-trashed children of `folder_id`, one page at a time.
    async fn list_folder(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<DriveFilePage, GatewayError>;

    /// Export a native Google document to `export_mime` text.
    async fn export_text(&self, file_id: &str, export_mime: &str) -> Result<String, GatewayError>;

    async fn download(&self, file_id: &str) -> Result<Bytes, GatewayError>;

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<DriveFile, GatewayError>;
}

#[async_trait]
pub trait DriveConnector: Send + Sync {
    async fn connect(&self, refresh_token: &str) -> Result<Arc<dyn DriveFiles>, GatewayError>;
}

/// Drain every page of a folder listing.
pub async fn list_all(
    drive: &dyn DriveFiles,
    folder_id: &str,
) -> Result<Vec<DriveFile>, GatewayError> {
    let mut out = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = drive.list_folder(folder_id, page_token.as_deref()).await?;
        out.extend(page.files);
        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    Ok(out)
}
