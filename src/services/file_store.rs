use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// A completed upload persisted outside the temporary workspace.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub size: i64,
    #[serde(skip)]
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

/// Permanent home for finished uploads, used by the completion handler and
/// the download/delete actions.
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    /// Takes ownership of the bytes at `source` and records them under `name`.
    async fn persist(&self, source: &Path, name: &str) -> Result<FileRecord>;
    async fn find(&self, id: &str) -> Result<Option<FileRecord>>;
    async fn open_content(&self, record: &FileRecord) -> Result<tokio::fs::File>;
    /// Returns false when no record matched.
    async fn delete(&self, id: &str) -> Result<bool>;
}

pub struct SqliteFileStore {
    pool: SqlitePool,
    root: PathBuf,
}

impl SqliteFileStore {
    pub fn new(pool: SqlitePool, root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            root: root.into(),
        }
    }

    /// Connects to `database_url`, creates the schema and the storage root.
    pub async fn connect(database_url: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own copy.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self::new(pool, root);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS file_records (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                storage_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating storage directory {:?}", self.root))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl FileRecordStore for SqliteFileStore {
    async fn persist(&self, source: &Path, name: &str) -> Result<FileRecord> {
        let id = Uuid::new_v4().to_string();
        let dest = self.root.join(&id);
        let size = tokio::fs::metadata(source)
            .await
            .with_context(|| format!("reading size of {:?}", source))?
            .len() as i64;

        let record = FileRecord {
            id,
            name: name.to_string(),
            size,
            storage_path: dest.to_string_lossy().into_owned(),
            created_at: Utc::now(),
        };

        // The row goes in first so content never lands in storage unreferenced.
        sqlx::query(
            "INSERT INTO file_records (id, name, size, storage_path, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.size)
        .bind(&record.storage_path)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if let Err(e) = move_into_storage(source, &dest).await {
            if let Err(db_err) = sqlx::query("DELETE FROM file_records WHERE id = ?")
                .bind(&record.id)
                .execute(&self.pool)
                .await
            {
                tracing::error!("Failed to roll back record {}: {}", record.id, db_err);
            }
            return Err(e);
        }

        tracing::info!("💾 Stored {} as record {} ({} bytes)", name, record.id, size);
        Ok(record)
    }

    async fn find(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT id, name, size, storage_path, created_at FROM file_records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn open_content(&self, record: &FileRecord) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&record.storage_path)
            .await
            .with_context(|| format!("opening content of record {}", record.id))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(record) = self.find(id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM file_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if let Err(e) = tokio::fs::remove_file(&record.storage_path).await {
            tracing::warn!("Record {} deleted but its content could not be: {}", id, e);
        }
        Ok(true)
    }
}

/// Renames `source` to `dest`, copying when they live on different
/// filesystems. A failed copy leaves nothing behind at `dest`.
async fn move_into_storage(source: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(source, dest).await {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e).with_context(|| format!("copying {:?} to {:?}", source, dest));
    }
    Ok(())
}
