use axum::body::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use url::Url;

use crate::db::models::logical_doc_id;
use crate::db::{AccountStorage, DriveAccount, FileStatus, TrackedFile, TrackedFileStorage};
use crate::drive::{DriveConnector, DriveFile, DriveFiles};
use crate::error::GatewayError;
use crate::google_oauth::OauthFlow;
use crate::google_oauth::state::StateSigner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveStatus {
    pub linked: bool,
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    pub user_id: String,
    pub linked: bool,
    pub refresh_token_stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Drive account linkage: OAuth linking, the cached app folder, uploads.
pub struct AccountService {
    accounts: AccountStorage,
    files: TrackedFileStorage,
    oauth: Arc<dyn OauthFlow>,
    connector: Arc<dyn DriveConnector>,
    state: StateSigner,
    folder_name: String,
    folder_locks: FolderLocks,
}

impl AccountService {
    pub fn new(
        accounts: AccountStorage,
        files: TrackedFileStorage,
        oauth: Arc<dyn OauthFlow>,
        connector: Arc<dyn DriveConnector>,
        state: StateSigner,
        folder_name: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            files,
            oauth,
            connector,
            state,
            folder_name: folder_name.into(),
            folder_locks: FolderLocks::default(),
        }
    }

    pub async fn status(&self, user_id: &str) -> Result<DriveStatus, GatewayError> {
        let account = self.accounts.get(user_id).await?;
        Ok(DriveStatus {
            linked: account.is_some(),
            folder_id: account.and_then(|a| a.folder_id),
        })
    }

    pub async fn account_or_fail(&self, user_id: &str) -> Result<DriveAccount, GatewayError> {
        match self.accounts.get(user_id).await? {
            Some(account) if !account.refresh_token.is_empty() => Ok(account),
            _ => Err(GatewayError::NotLinked),
        }
    }

    pub async fn open_drive(
        &self,
        account: &DriveAccount,
    ) -> Result<Arc<dyn DriveFiles>, GatewayError> {
        self.connector.connect(&account.refresh_token).await
    }

    /// Consent page URL for `user_id`; the signed state expires in ten minutes.
    pub fn start_link(&self, user_id: &str) -> Result<Url, GatewayError> {
        let state = self.state.issue(user_id)?;
        self.oauth.authorize_url(&state)
    }

    /// Finish the consent redirect.
    ///
    /// Google only issues a refresh token on first consent. Without one, an
    /// already stored token is kept; with nothing stored the user has to revoke
    /// access and consent again.
    pub async fn complete_link(
        &self,
        code: &str,
        state: &str,
    ) -> Result<LinkOutcome, GatewayError> {
        let user_id = self.state.verify(state)?;
        let tokens = self.oauth.exchange_code(code).await?;

        let Some(refresh_token) = tokens.refresh_token else {
            let existing = self.accounts.get(&user_id).await?;
            if !existing.is_some_and(|a| !a.refresh_token.is_empty()) {
                warn!(user_id = %user_id, "consent returned no refresh token and none is stored");
                return Err(GatewayError::RefreshTokenNotIssued);
            }
            self.accounts
                .touch_link(&user_id, tokens.scope.as_deref(), tokens.token_type.as_deref())
                .await?;
            info!(user_id = %user_id, "Drive link refreshed; stored refresh token reused");
            return Ok(LinkOutcome {
                user_id,
                linked: true,
                refresh_token_stored: true,
                note: Some("refresh_token reused (not re-issued by Google)".to_string()),
            });
        };

        self.accounts
            .upsert_link(&DriveAccount {
                user_id: user_id.clone(),
                refresh_token,
                folder_id: None,
                scope: tokens.scope,
                token_type: tokens.token_type,
            })
            .await?;
        info!(user_id = %user_id, "Drive linked");
        Ok(LinkOutcome {
            user_id,
            linked: true,
            refresh_token_stored: true,
            note: None,
        })
    }

    pub async fn ensure_app_folder(&self, user_id: &str) -> Result<String, GatewayError> {
        let account = self.account_or_fail(user_id).await?;
        if let Some(folder_id) = account.folder_id {
            return Ok(folder_id);
        }
        let drive = self.open_drive(&account).await?;
        self.ensure_app_folder_with(user_id, drive.as_ref()).await
    }

    /// Resolve the app folder: cached id, else search by name, else create.
    ///
    /// Serialized per user inside this process so concurrent first calls do not
    /// create two folders. Separate gateway processes can still race.
    pub async fn ensure_app_folder_with(
        &self,
        user_id: &str,
        drive: &dyn DriveFiles,
    ) -> Result<String, GatewayError> {
        let lease = self.folder_locks.acquire(user_id);
        let _guard = lease.lock.lock().await;

        let account = self.account_or_fail(user_id).await?;
        if let Some(folder_id) = account.folder_id {
            return Ok(folder_id);
        }

        let folder_id = match drive.find_folder(&self.folder_name).await? {
            Some(id) => id,
            None => {
                info!(user_id = %user_id, folder = %self.folder_name, "creating Drive app folder");
                drive.create_folder(&self.folder_name).await?
            }
        };
        if folder_id.is_empty() {
            return Err(GatewayError::Internal(
                "Failed to create/find Drive app folder".to_string(),
            ));
        }
        self.accounts.set_folder(user_id, &folder_id).await?;
        Ok(folder_id)
    }

    /// Upload into the app folder and start tracking the file as `pending`.
    pub async fn upload(
        &self,
        user_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<DriveFile, GatewayError> {
        let account = self.account_or_fail(user_id).await?;
        let drive = self.open_drive(&account).await?;
        let folder_id = self.ensure_app_folder_with(user_id, drive.as_ref()).await?;

        let file = drive.upload(&folder_id, name, mime_type, data).await?;
        self.files
            .upsert(&TrackedFile {
                user_id: user_id.to_string(),
                drive_file_id: file.id.clone(),
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                md5_checksum: file.md5_checksum.clone(),
                modified_time: file.modified_time,
                doc_id: logical_doc_id(&file.id),
                status: FileStatus::Pending,
                last_error: None,
                indexed_at: None,
                indexed_modified_time: None,
            })
            .await?;
        info!(user_id = %user_id, file_id = %file.id, "uploaded file to Drive");
        Ok(file)
    }
}

type LockMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Per-user async locks. An entry lives only while some lease holds it.
#[derive(Default)]
struct FolderLocks {
    inner: Arc<LockMap>,
}

impl FolderLocks {
    fn acquire(&self, user_id: &str) -> FolderLease {
        let mut locks = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = locks.entry(user_id.to_string()).or_default().clone();
        FolderLease {
            map: self.inner.clone(),
            user_id: user_id.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

struct FolderLease {
    map: Arc<LockMap>,
    user_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for FolderLease {
    fn drop(&mut self) {
        let mut locks = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // the map's copy plus ours: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}
