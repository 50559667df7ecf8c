//! Persistent storage: Drive account links, tracked Drive files, documents.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite)
//! - `sqlite.rs`: one storage handle per table over a shared pool

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{Document, DriveAccount, FileStatus, TrackedFile};
pub use schema::SQLITE_INIT;
pub use sqlite::{AccountStorage, DocumentStorage, SqlitePool, TrackedFileStorage, connect};
