use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Drive linkage for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveAccount {
    pub user_id: String,
    pub refresh_token: String,
    pub folder_id: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Indexed,
    Skipped,
    Error,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Indexed => "indexed",
            FileStatus::Skipped => "skipped",
            FileStatus::Error => "error",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "indexed" => Ok(FileStatus::Indexed),
            "skipped" => Ok(FileStatus::Skipped),
            "error" => Ok(FileStatus::Error),
            "deleted" => Ok(FileStatus::Deleted),
            other => Err(format!("unknown file status: {other}")),
        }
    }
}

/// Index key for a Drive file. Pure function of the Drive id, so repeated
/// syncs address the same index entry.
pub fn logical_doc_id(drive_file_id: &str) -> String {
    format!("drive:{drive_file_id}")
}

/// Indexing state of one Drive file.
///
/// `indexed_at` / `indexed_modified_time` are only ever set by a successful
/// index; writes that leave them `None` keep the stored values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub user_id: String,
    pub drive_file_id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub md5_checksum: Option<String>,
    pub modified_time: Option<DateTime<Utc>>,
    pub doc_id: String,
    pub status: FileStatus,
    pub last_error: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub indexed_modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
