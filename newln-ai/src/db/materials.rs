//! Material persistence
//!
//! [`MaterialStore`] is the persistence collaborator of the generation
//! pipeline. Each flag or status has its own typed update method.

use crate::models::{
    count_words, ArtifactList, ArtifactListDetail, EnrichedItem, Material, MaterialDetail,
    MaterialUpdate, NewMaterial, StoredItem,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newln_common::{ArtifactKind, Error, JobStatus, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Persistence operations used by the orchestrator and the HTTP layer
#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Insert a material: both pending flags set, status pending
    async fn create_material(&self, new: &NewMaterial) -> Result<Material>;

    async fn get_material(&self, material_key: &str) -> Result<Option<Material>>;

    async fn get_material_status(&self, material_key: &str) -> Result<Option<JobStatus>>;

    /// Materials whose title contains `search` (case-insensitive), newest first
    async fn list_materials(&self, search: Option<&str>) -> Result<Vec<Material>>;

    /// Apply `update`; generated lists are left as they are
    async fn update_material(&self, material_key: &str, update: &MaterialUpdate) -> Result<Material>;

    /// Remove a material together with its lists and items
    async fn delete_material(&self, material_key: &str) -> Result<()>;

    /// Create an empty list for `kind`; returns its id
    async fn create_artifact_list(&self, material_key: &str, kind: ArtifactKind) -> Result<i64>;

    /// Insert all items atomically
    async fn bulk_insert_items(&self, list_id: i64, items: &[EnrichedItem]) -> Result<()>;

    async fn update_list_status(&self, list_id: i64, status: JobStatus) -> Result<()>;

    async fn update_pending_word_list(&self, material_key: &str, pending: bool) -> Result<()>;

    async fn update_pending_phrase_list(&self, material_key: &str, pending: bool) -> Result<()>;

    async fn update_material_status(&self, material_key: &str, status: JobStatus) -> Result<()>;

    async fn artifact_lists(&self, material_key: &str) -> Result<Vec<ArtifactList>>;

    async fn list_items(&self, list_id: i64) -> Result<Vec<StoredItem>>;
}

/// Material with all of its lists and items
pub async fn load_material_detail(
    store: &dyn MaterialStore,
    material_key: &str,
) -> Result<Option<MaterialDetail>> {
    let Some(material) = store.get_material(material_key).await? else {
        return Ok(None);
    };

    let mut lists = Vec::new();
    for list in store.artifact_lists(material_key).await? {
        let items = store.list_items(list.id).await?;
        lists.push(ArtifactListDetail { list, items });
    }

    Ok(Some(MaterialDetail { material, lists }))
}

/// SQLite-backed [`MaterialStore`]
#[derive(Clone)]
pub struct SqliteMaterialStore {
    pool: SqlitePool,
}

impl SqliteMaterialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn set_pending_flag(&self, column: PendingColumn, material_key: &str, pending: bool) -> Result<()> {
        let sql = match column {
            PendingColumn::WordList => {
                "UPDATE materials SET has_pending_word_list = ?, updated_at = ? WHERE material_key = ?"
            }
            PendingColumn::PhraseList => {
                "UPDATE materials SET has_pending_phrase_list = ?, updated_at = ? WHERE material_key = ?"
            }
        };

        let result = sqlx::query(sql)
            .bind(pending)
            .bind(Utc::now())
            .bind(material_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Material {}", material_key)));
        }
        Ok(())
    }
}

const MATERIAL_COLUMNS: &str = "material_key, title, content, word_count, status, \
     has_pending_word_list, has_pending_phrase_list, created_at, updated_at";

#[derive(Clone, Copy)]
enum PendingColumn {
    WordList,
    PhraseList,
}

fn material_from_row(row: &SqliteRow) -> Result<Material> {
    let status: String = row.try_get("status")?;
    Ok(Material {
        material_key: row.try_get("material_key")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        word_count: row.try_get("word_count")?,
        status: status.parse()?,
        has_pending_word_list: row.try_get("has_pending_word_list")?,
        has_pending_phrase_list: row.try_get("has_pending_phrase_list")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn list_from_row(row: &SqliteRow) -> Result<ArtifactList> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(ArtifactList {
        id: row.try_get("id")?,
        material_key: row.try_get("material_key")?,
        kind: kind.parse()?,
        title: row.try_get("title")?,
        status: status.parse()?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<StoredItem> {
    let importance: String = row.try_get("importance")?;
    Ok(StoredItem {
        id: row.try_get("id")?,
        list_id: row.try_get("list_id")?,
        text: row.try_get("text")?,
        meaning: row.try_get("meaning")?,
        translated_meaning: row.try_get("translated_meaning")?,
        example: row.try_get("example")?,
        pos: row.try_get("pos")?,
        difficulty: row.try_get("difficulty")?,
        importance: importance.parse()?,
    })
}

#[async_trait]
impl MaterialStore for SqliteMaterialStore {
    async fn create_material(&self, new: &NewMaterial) -> Result<Material> {
        if new.content.trim().is_empty() {
            return Err(Error::InvalidInput("Material content is empty".to_string()));
        }

        let now = Utc::now();
        let material = Material {
            material_key: Uuid::new_v4().to_string(),
            title: new.title.trim().to_string(),
            content: new.content.clone(),
            word_count: count_words(&new.content),
            status: JobStatus::Pending,
            has_pending_word_list: true,
            has_pending_phrase_list: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO materials (
                material_key, title, content, word_count, status,
                has_pending_word_list, has_pending_phrase_list, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&material.material_key)
        .bind(&material.title)
        .bind(&material.content)
        .bind(material.word_count)
        .bind(material.status.as_str())
        .bind(material.has_pending_word_list)
        .bind(material.has_pending_phrase_list)
        .bind(material.created_at)
        .bind(material.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            material_key = %material.material_key,
            word_count = material.word_count,
            "Material created"
        );

        Ok(material)
    }

    async fn get_material(&self, material_key: &str) -> Result<Option<Material>> {
        let sql = format!("SELECT {} FROM materials WHERE material_key = ?", MATERIAL_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(material_key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(material_from_row).transpose()
    }

    async fn get_material_status(&self, material_key: &str) -> Result<Option<JobStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM materials WHERE material_key = ?")
                .bind(material_key)
                .fetch_optional(&self.pool)
                .await?;

        status.map(|s| s.parse()).transpose()
    }

    async fn list_materials(&self, search: Option<&str>) -> Result<Vec<Material>> {
        let term = search.map(str::trim).filter(|t| !t.is_empty());

        let rows = match term {
            Some(term) => {
                let sql = format!(
                    "SELECT {} FROM materials WHERE instr(lower(title), lower(?)) > 0 \
                     ORDER BY created_at DESC, rowid DESC",
                    MATERIAL_COLUMNS
                );
                sqlx::query(&sql).bind(term).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM materials ORDER BY created_at DESC, rowid DESC",
                    MATERIAL_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(material_from_row).collect()
    }

    async fn update_material(&self, material_key: &str, update: &MaterialUpdate) -> Result<Material> {
        let mut material = self
            .get_material(material_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Material {}", material_key)))?;

        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("Material title is empty".to_string()));
            }
            material.title = title.trim().to_string();
        }
        if let Some(content) = &update.content {
            if content.trim().is_empty() {
                return Err(Error::InvalidInput("Material content is empty".to_string()));
            }
            material.content = content.clone();
            material.word_count = count_words(content);
        }
        material.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE materials
            SET title = ?, content = ?, word_count = ?, updated_at = ?
            WHERE material_key = ?
            "#,
        )
        .bind(&material.title)
        .bind(&material.content)
        .bind(material.word_count)
        .bind(material.updated_at)
        .bind(material_key)
        .execute(&self.pool)
        .await?;

        Ok(material)
    }

    async fn delete_material(&self, material_key: &str) -> Result<()> {
        // Lists and items follow through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM materials WHERE material_key = ?")
            .bind(material_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Material {}", material_key)));
        }
        tracing::debug!(material_key, "Material deleted");
        Ok(())
    }

    async fn create_artifact_list(&self, material_key: &str, kind: ArtifactKind) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO artifact_lists (material_key, kind, title, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(material_key)
        .bind(kind.as_str())
        .bind(kind.default_list_title())
        .bind(JobStatus::Pending.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn bulk_insert_items(&self, list_id: i64, items: &[EnrichedItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO artifact_items (
                    list_id, text, meaning, translated_meaning, example, pos, difficulty, importance
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(list_id)
            .bind(&item.text)
            .bind(&item.meaning)
            .bind(&item.translated_meaning)
            .bind(&item.example)
            .bind(&item.pos)
            .bind(&item.difficulty)
            .bind(item.importance.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_list_status(&self, list_id: i64, status: JobStatus) -> Result<()> {
        let result = sqlx::query("UPDATE artifact_lists SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(list_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Artifact list {}", list_id)));
        }
        Ok(())
    }

    async fn update_pending_word_list(&self, material_key: &str, pending: bool) -> Result<()> {
        self.set_pending_flag(PendingColumn::WordList, material_key, pending)
            .await
    }

    async fn update_pending_phrase_list(&self, material_key: &str, pending: bool) -> Result<()> {
        self.set_pending_flag(PendingColumn::PhraseList, material_key, pending)
            .await
    }

    async fn update_material_status(&self, material_key: &str, status: JobStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE materials SET status = ?, updated_at = ? WHERE material_key = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(material_key)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Material {}", material_key)));
        }
        Ok(())
    }

    async fn artifact_lists(&self, material_key: &str) -> Result<Vec<ArtifactList>> {
        let rows = sqlx::query(
            r#"
            SELECT id, material_key, kind, title, status, created_at
            FROM artifact_lists
            WHERE material_key = ?
            ORDER BY id
            "#,
        )
        .bind(material_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(list_from_row).collect()
    }

    async fn list_items(&self, list_id: i64) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, list_id, text, meaning, translated_meaning, example, pos, difficulty, importance
            FROM artifact_items
            WHERE list_id = ?
            ORDER BY id
            "#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }
}
