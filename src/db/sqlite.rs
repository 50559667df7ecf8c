use crate::db::models::{Document, DriveAccount, FileStatus, TrackedFile};
use crate::db::schema::SQLITE_INIT;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

pub type SqlitePool = Pool<Sqlite>;

/// Open (creating if missing) the database and apply the bundled DDL.
///
/// In-memory URLs get a single connection so every query sees the same database.
pub async fn connect(database_url: &str) -> Result<SqlitePool, GatewayError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let mut pool_opts = SqlitePoolOptions::new();
    if database_url.contains(":memory:") {
        pool_opts = pool_opts
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);
    }
    let pool = pool_opts.connect_with(connect_opts).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), GatewayError> {
    // sqlx::query runs one statement at a time
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

fn to_text(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

fn parse_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, GatewayError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| GatewayError::Database(sqlx::Error::Decode(Box::new(e))))
    })
    .transpose()
}

#[derive(Clone)]
pub struct AccountStorage {
    pool: SqlitePool,
}

impl AccountStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<DriveAccount>, GatewayError> {
        let row = sqlx::query(
            r#"SELECT user_id, refresh_token, folder_id, scope, token_type
               FROM drive_accounts WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    /// Store a freshly issued refresh token. Any cached folder id is reset,
    /// the new grant may belong to a different Google account.
    pub async fn upsert_link(&self, account: &DriveAccount) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO drive_accounts (user_id, refresh_token, folder_id, scope, token_type, updated_at)
            VALUES (?, ?, NULL, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                refresh_token=excluded.refresh_token,
                folder_id=NULL,
                scope=excluded.scope,
                token_type=excluded.token_type,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(&account.user_id)
        .bind(&account.refresh_token)
        .bind(&account.scope)
        .bind(&account.token_type)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a repeat consent that came back without a refresh token.
    pub async fn touch_link(
        &self,
        user_id: &str,
        scope: Option<&str>,
        token_type: Option<&str>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE drive_accounts SET scope = ?, token_type = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(scope)
        .bind(token_type)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_folder(&self, user_id: &str, folder_id: &str) -> Result<(), GatewayError> {
        sqlx::query("UPDATE drive_accounts SET folder_id = ?, updated_at = ? WHERE user_id = ?")
            .bind(folder_id)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_model(row: SqliteRow) -> Result<DriveAccount, GatewayError> {
        Ok(DriveAccount {
            user_id: row.try_get("user_id")?,
            refresh_token: row.try_get("refresh_token")?,
            folder_id: row.try_get("folder_id")?,
            scope: row.try_get("scope")?,
            token_type: row.try_get("token_type")?,
        })
    }
}

#[derive(Clone)]
pub struct TrackedFileStorage {
    pool: SqlitePool,
}

impl TrackedFileStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<TrackedFile>, GatewayError> {
        let rows = sqlx::query(
            r#"SELECT user_id, drive_file_id, name, mime_type, md5_checksum, modified_time,
               doc_id, status, last_error, indexed_at, indexed_modified_time
               FROM drive_files WHERE user_id = ? ORDER BY drive_file_id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    pub async fn get(
        &self,
        user_id: &str,
        drive_file_id: &str,
    ) -> Result<Option<TrackedFile>, GatewayError> {
        let row = sqlx::query(
            r#"SELECT user_id, drive_file_id, name, mime_type, md5_checksum, modified_time,
               doc_id, status, last_error, indexed_at, indexed_modified_time
               FROM drive_files WHERE user_id = ? AND drive_file_id = ?"#,
        )
        .bind(user_id)
        .bind(drive_file_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    /// Upsert by (user_id, drive_file_id). `indexed_at` and
    /// `indexed_modified_time` only move forward: `None` keeps the stored value.
    pub async fn upsert(&self, file: &TrackedFile) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO drive_files (
                user_id, drive_file_id, name, mime_type, md5_checksum, modified_time,
                doc_id, status, last_error, indexed_at, indexed_modified_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, drive_file_id) DO UPDATE SET
                name=excluded.name,
                mime_type=excluded.mime_type,
                md5_checksum=excluded.md5_checksum,
                modified_time=excluded.modified_time,
                doc_id=excluded.doc_id,
                status=excluded.status,
                last_error=excluded.last_error,
                indexed_at=COALESCE(excluded.indexed_at, drive_files.indexed_at),
                indexed_modified_time=COALESCE(excluded.indexed_modified_time, drive_files.indexed_modified_time)
            "#,
        )
        .bind(&file.user_id)
        .bind(&file.drive_file_id)
        .bind(&file.name)
        .bind(&file.mime_type)
        .bind(&file.md5_checksum)
        .bind(to_text(file.modified_time))
        .bind(&file.doc_id)
        .bind(file.status.as_str())
        .bind(&file.last_error)
        .bind(to_text(file.indexed_at))
        .bind(to_text(file.indexed_modified_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(
        &self,
        user_id: &str,
        drive_file_id: &str,
        status: FileStatus,
    ) -> Result<(), GatewayError> {
        sqlx::query("UPDATE drive_files SET status = ? WHERE user_id = ? AND drive_file_id = ?")
            .bind(status.as_str())
            .bind(user_id)
            .bind(drive_file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_model(row: SqliteRow) -> Result<TrackedFile, GatewayError> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<FileStatus>()
            .map_err(|e| GatewayError::Database(sqlx::Error::Decode(e.into())))?;
        Ok(TrackedFile {
            user_id: row.try_get("user_id")?,
            drive_file_id: row.try_get("drive_file_id")?,
            name: row.try_get("name")?,
            mime_type: row.try_get("mime_type")?,
            md5_checksum: row.try_get("md5_checksum")?,
            modified_time: parse_ts(row.try_get("modified_time")?)?,
            doc_id: row.try_get("doc_id")?,
            status,
            last_error: row.try_get("last_error")?,
            indexed_at: parse_ts(row.try_get("indexed_at")?)?,
            indexed_modified_time: parse_ts(row.try_get("indexed_modified_time")?)?,
        })
    }
}

#[derive(Clone)]
pub struct DocumentStorage {
    pool: SqlitePool,
}

impl DocumentStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, title: &str) -> Result<Document, GatewayError> {
        let doc = Document {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO documents (id, user_id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(&doc.id)
            .bind(&doc.user_id)
            .bind(&doc.title)
            .bind(doc.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Document>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, created_at FROM documents WHERE user_id = ? ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    /// `None` when the document does not exist or belongs to someone else.
    pub async fn get(&self, user_id: &str, id: &str) -> Result<Option<Document>, GatewayError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, created_at FROM documents WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    fn row_to_model(row: SqliteRow) -> Result<Document, GatewayError> {
        let created_at: String = row.try_get("created_at")?;
        Ok(Document {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            created_at: parse_ts(Some(created_at))?.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::logical_doc_id;
    use chrono::TimeZone;

    async fn memory_pool() -> SqlitePool {
        connect("sqlite::memory:").await.unwrap()
    }

    fn tracked(id: &str, status: FileStatus) -> TrackedFile {
        TrackedFile {
            user_id: "u1".into(),
            drive_file_id: id.into(),
            name: Some(format!("{id}.txt")),
            mime_type: Some("text/plain".into()),
            md5_checksum: None,
            modified_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            doc_id: logical_doc_id(id),
            status,
            last_error: None,
            indexed_at: None,
            indexed_modified_time: None,
        }
    }

    #[tokio::test]
    async fn account_link_lifecycle() {
        let store = AccountStorage::new(memory_pool().await);
        assert!(store.get("u1").await.unwrap().is_none());

        let account = DriveAccount {
            user_id: "u1".into(),
            refresh_token: "rt-1".into(),
            folder_id: None,
            scope: Some("drive.file".into()),
            token_type: Some("Bearer".into()),
        };
        store.upsert_link(&account).await.unwrap();
        store.set_folder("u1", "folder-9").await.unwrap();
        assert_eq!(
            store.get("u1").await.unwrap().unwrap().folder_id.as_deref(),
            Some("folder-9")
        );

        store.touch_link("u1", Some("other"), None).await.unwrap();
        let got = store.get("u1").await.unwrap().unwrap();
        assert_eq!(got.refresh_token, "rt-1");
        assert_eq!(got.scope.as_deref(), Some("other"));
        assert_eq!(got.folder_id.as_deref(), Some("folder-9"));

        let relinked = DriveAccount {
            refresh_token: "rt-2".into(),
            ..account
        };
        store.upsert_link(&relinked).await.unwrap();
        let got = store.get("u1").await.unwrap().unwrap();
        assert_eq!(got.refresh_token, "rt-2");
        assert!(got.folder_id.is_none());
    }

    #[tokio::test]
    async fn failed_upsert_keeps_indexed_watermark() {
        let store = TrackedFileStorage::new(memory_pool().await);
        let mut file = tracked("f1", FileStatus::Indexed);
        file.indexed_at = Some(Utc::now());
        file.indexed_modified_time = file.modified_time;
        store.upsert(&file).await.unwrap();

        let mut failed = tracked("f1", FileStatus::Error);
        failed.last_error = Some("boom".into());
        store.upsert(&failed).await.unwrap();

        let got = store.get("u1", "f1").await.unwrap().unwrap();
        assert_eq!(got.status, FileStatus::Error);
        assert_eq!(got.last_error.as_deref(), Some("boom"));
        assert_eq!(got.indexed_modified_time, file.modified_time);
    }

    #[tokio::test]
    async fn files_are_scoped_per_user() {
        let store = TrackedFileStorage::new(memory_pool().await);
        store.upsert(&tracked("a", FileStatus::Pending)).await.unwrap();
        let mut other = tracked("b", FileStatus::Pending);
        other.user_id = "u2".into();
        store.upsert(&other).await.unwrap();

        let mine = store.list_for_user("u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].drive_file_id, "a");

        store.set_status("u1", "a", FileStatus::Deleted).await.unwrap();
        assert_eq!(
            store.get("u1", "a").await.unwrap().unwrap().status,
            FileStatus::Deleted
        );
    }

    #[tokio::test]
    async fn documents_are_private() {
        let store = DocumentStorage::new(memory_pool().await);
        let doc = store.create("u1", "Invoice").await.unwrap();
        assert_eq!(store.list("u1").await.unwrap(), vec![doc.clone()]);
        assert!(store.get("u2", &doc.id).await.unwrap().is_none());
        assert_eq!(store.get("u1", &doc.id).await.unwrap(), Some(doc));
    }
}
