use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::accounts::AccountService;
use crate::db::models::logical_doc_id;
use crate::db::{FileStatus, TrackedFile, TrackedFileStorage};
use crate::drive::mime::{Extraction, classify};
use crate::drive::{DriveFile, DriveFiles, list_all};
use crate::error::GatewayError;
use crate::upstream::Processing;
use crate::upstream::types::{ImageSource, IndexUpsert, OcrRequest, PageText};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub errored: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub file_id: String,
    pub name: Option<String>,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub folder_id: String,
    pub counts: SyncCounts,
    pub results: Vec<FileOutcome>,
}

enum Extracted {
    Pages(Vec<PageText>),
    Unsupported(String),
}

/// Reconciles a user's Drive app folder with the search index.
///
/// Files are processed one at a time. A failure is recorded against that file
/// and the pass moves on; nothing is rolled back.
pub struct SyncEngine {
    accounts: Arc<AccountService>,
    files: TrackedFileStorage,
    processing: Arc<dyn Processing>,
    ocr_languages: Vec<String>,
}

impl SyncEngine {
    pub fn new(
        accounts: Arc<AccountService>,
        files: TrackedFileStorage,
        processing: Arc<dyn Processing>,
        ocr_languages: Vec<String>,
    ) -> Self {
        Self {
            accounts,
            files,
            processing,
            ocr_languages,
        }
    }

    pub async fn sync(&self, user_id: &str) -> Result<SyncReport, GatewayError> {
        let account = self.accounts.account_or_fail(user_id).await?;
        let drive = self.accounts.open_drive(&account).await?;
        let folder_id = self
            .accounts
            .ensure_app_folder_with(user_id, drive.as_ref())
            .await?;

        let live = list_all(drive.as_ref(), &folder_id).await?;
        info!(user_id = %user_id, folder_id = %folder_id, files = live.len(), "sync pass started");

        self.mark_deleted(user_id, &live).await?;

        let mut counts = SyncCounts {
            total: live.len(),
            ..SyncCounts::default()
        };
        let mut results = Vec::with_capacity(live.len());
        for file in &live {
            if file.id.is_empty() {
                continue;
            }
            let outcome = self.sync_file(user_id, drive.as_ref(), file).await;
            match outcome.status {
                FileStatus::Indexed => counts.indexed += 1,
                FileStatus::Skipped => counts.skipped += 1,
                FileStatus::Error => counts.errored += 1,
                FileStatus::Pending | FileStatus::Deleted => {}
            }
            results.push(outcome);
        }

        info!(
            user_id = %user_id,
            indexed = counts.indexed,
            skipped = counts.skipped,
            errored = counts.errored,
            "sync pass finished"
        );
        Ok(SyncReport {
            folder_id,
            counts,
            results,
        })
    }

    /// Files tracked earlier but gone from the listing get one best-effort
    /// index delete and are marked `deleted` whatever its outcome.
    async fn mark_deleted(&self, user_id: &str, live: &[DriveFile]) -> Result<(), GatewayError> {
        let live_ids: HashSet<&str> = live
            .iter()
            .map(|f| f.id.as_str())
            .filter(|id| !id.is_empty())
            .collect();

        for tracked in self.files.list_for_user(user_id).await? {
            if live_ids.contains(tracked.drive_file_id.as_str())
                || tracked.status == FileStatus::Deleted
            {
                continue;
            }
            let doc_id = if tracked.doc_id.is_empty() {
                logical_doc_id(&tracked.drive_file_id)
            } else {
                tracked.doc_id.clone()
            };
            if let Err(e) = self.processing.delete_index(user_id, &doc_id).await {
                warn!(user_id = %user_id, doc_id = %doc_id, error = %e, "index delete failed; marking deleted anyway");
            }
            if let Err(e) = self
                .files
                .set_status(user_id, &tracked.drive_file_id, FileStatus::Deleted)
                .await
            {
                warn!(user_id = %user_id, file_id = %tracked.drive_file_id, error = %e, "could not mark file deleted");
            }
        }
        Ok(())
    }

    async fn sync_file(
        &self,
        user_id: &str,
        drive: &dyn DriveFiles,
        file: &DriveFile,
    ) -> FileOutcome {
        let outcome = |status, detail: Option<String>, pages| FileOutcome {
            file_id: file.id.clone(),
            name: file.name.clone(),
            status,
            detail,
            pages,
        };

        match self.already_indexed(user_id, file).await {
            Ok(true) => {
                debug!(file_id = %file.id, "unchanged since last index");
                return outcome(FileStatus::Skipped, Some("already indexed".into()), None);
            }
            Ok(false) => {}
            Err(e) => warn!(file_id = %file.id, error = %e, "could not read tracked state"),
        }

        let doc_id = logical_doc_id(&file.id);
        let indexed = self.index_file(user_id, drive, file, &doc_id).await;

        let mut record = self.tracked(user_id, file, &doc_id);
        let result = match indexed {
            Ok(Ok(pages)) => {
                record.status = FileStatus::Indexed;
                record.indexed_at = Some(Utc::now());
                record.indexed_modified_time = file.modified_time;
                outcome(FileStatus::Indexed, None, Some(pages))
            }
            Ok(Err(mime)) => {
                record.status = FileStatus::Skipped;
                record.last_error = Some(format!("Unsupported mimeType: {mime}"));
                outcome(
                    FileStatus::Skipped,
                    Some(format!("unsupported mimeType: {mime}")),
                    None,
                )
            }
            Err(e) => {
                let message = e.to_string();
                warn!(user_id = %user_id, file_id = %file.id, error = %message, "file sync failed");
                record.status = FileStatus::Error;
                record.last_error = Some(message.clone());
                outcome(FileStatus::Error, Some(message), None)
            }
        };

        if let Err(e) = self.files.upsert(&record).await {
            warn!(user_id = %user_id, file_id = %file.id, error = %e, "could not record file state");
        }
        result
    }

    /// Number of pages indexed, or the MIME type when the file was not indexable.
    async fn index_file(
        &self,
        user_id: &str,
        drive: &dyn DriveFiles,
        file: &DriveFile,
        doc_id: &str,
    ) -> Result<Result<usize, String>, GatewayError> {
        let pages = match self.extract(user_id, drive, file).await? {
            Extracted::Unsupported(mime) => return Ok(Err(mime)),
            Extracted::Pages(pages) => pages,
        };
        let count = pages.len();
        let req = IndexUpsert {
            doc_id: doc_id.to_string(),
            title: Some(file.name.clone().unwrap_or_else(|| doc_id.to_string())),
            replace: true,
            pages,
        };
        self.processing.upsert_index(user_id, &req).await?;
        Ok(Ok(count))
    }

    async fn already_indexed(&self, user_id: &str, file: &DriveFile) -> Result<bool, GatewayError> {
        let Some(modified) = file.modified_time else {
            return Ok(false);
        };
        let tracked = self.files.get(user_id, &file.id).await?;
        Ok(tracked
            .filter(|t| t.status != FileStatus::Deleted)
            .and_then(|t| t.indexed_modified_time)
            .is_some_and(|indexed| indexed >= modified))
    }

    async fn extract(
        &self,
        user_id: &str,
        drive: &dyn DriveFiles,
        file: &DriveFile,
    ) -> Result<Extracted, GatewayError> {
        let mime = file.mime_type.as_deref().unwrap_or_default();
        let pages = match classify(mime) {
            Extraction::Export(target) => {
                PageText::single(drive.export_text(&file.id, target).await?)
            }
            Extraction::Ocr => {
                let bytes = drive.download(&file.id).await?;
                let ocr = self
                    .processing
                    .extract_text(
                        user_id,
                        OcrRequest {
                            page_id: format!("drive_{}", file.id),
                            image: ImageSource::Bytes(bytes),
                            languages: self.ocr_languages.clone(),
                            return_layout: false,
                        },
                    )
                    .await?;
                PageText::single(ocr.text)
            }
            Extraction::Pdf => {
                let bytes = drive.download(&file.id).await?;
                let extracted = self.processing.extract_pdf_text(user_id, bytes).await?;
                if extracted.pages.is_empty() {
                    PageText::single("")
                } else {
                    extracted.pages
                }
            }
            Extraction::PlainText => {
                let bytes = drive.download(&file.id).await?;
                PageText::single(String::from_utf8_lossy(&bytes))
            }
            Extraction::Unsupported => return Ok(Extracted::Unsupported(mime.to_string())),
        };
        Ok(Extracted::Pages(pages))
    }

    fn tracked(&self, user_id: &str, file: &DriveFile, doc_id: &str) -> TrackedFile {
        TrackedFile {
            user_id: user_id.to_string(),
            drive_file_id: file.id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            md5_checksum: file.md5_checksum.clone(),
            modified_time: file.modified_time,
            doc_id: doc_id.to_string(),
            status: FileStatus::Pending,
            last_error: None,
            indexed_at: None,
            indexed_modified_time: None,
        }
    }
}
