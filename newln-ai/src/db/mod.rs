//! Database access for newln-ai
//!
//! SQLite holds materials, their generated lists and the list items. Tables
//! are created on startup if missing.

pub mod materials;

pub use materials::{load_material_detail, MaterialStore, SqliteMaterialStore};

use newln_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with the schema applied
///
/// Single connection: every pooled connection to `sqlite::memory:` would
/// otherwise open its own empty database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create newln-ai tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS materials (
            material_key TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            word_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            has_pending_word_list INTEGER NOT NULL DEFAULT 1,
            has_pending_phrase_list INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifact_lists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            material_key TEXT NOT NULL REFERENCES materials(material_key) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifact_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            list_id INTEGER NOT NULL REFERENCES artifact_lists(id) ON DELETE CASCADE,
            text TEXT NOT NULL,
            meaning TEXT NOT NULL,
            translated_meaning TEXT NOT NULL,
            example TEXT,
            pos TEXT,
            difficulty TEXT,
            importance TEXT NOT NULL DEFAULT 'low'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_artifact_lists_material ON artifact_lists(material_key)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifact_items_list ON artifact_items(list_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (materials, artifact_lists, artifact_items)");

    Ok(())
}
