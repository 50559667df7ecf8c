//! SQL DDL for the gateway's own state.

/// - `drive_accounts`: one row per user, keyed by `user_id`
/// - `drive_files`: one row per (user, Drive file); rows are never removed,
///   vanished files move to status `deleted`
/// - `documents`: per-user document metadata
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS drive_accounts (
    user_id TEXT PRIMARY KEY NOT NULL,
    refresh_token TEXT NOT NULL,
    folder_id TEXT NULL,
    scope TEXT NULL,
    token_type TEXT NULL,
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS drive_files (
    user_id TEXT NOT NULL,
    drive_file_id TEXT NOT NULL,
    name TEXT NULL,
    mime_type TEXT NULL,
    md5_checksum TEXT NULL,
    modified_time TEXT NULL, -- RFC3339
    doc_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    last_error TEXT NULL,
    indexed_at TEXT NULL,
    indexed_modified_time TEXT NULL,
    PRIMARY KEY (user_id, drive_file_id)
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_user_id ON documents(user_id);
"#;
