use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use stash_types::{AssetId, AssetRecord, BackendKey, ContentDigest};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::Catalog;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS assets (
        id          TEXT PRIMARY KEY NOT NULL,
        file_name   TEXT NOT NULL,
        size        INTEGER NOT NULL,
        mime_type   TEXT NOT NULL,
        digest      TEXT NOT NULL,
        storage_key TEXT,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_assets_digest ON assets(digest)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_assets_storage_key ON assets(storage_key)",
    "CREATE INDEX IF NOT EXISTS idx_assets_created_at ON assets(created_at DESC, id DESC)",
];

const COLUMNS: &str = "id, file_name, size, mime_type, digest, storage_key, created_at, updated_at";

/// SQLite-backed catalog.
///
/// Timestamps are stored as microseconds since the Unix epoch so that
/// ordering by `created_at` is numeric.
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    /// Connect to `url` (e.g. `sqlite://stash.db` or `sqlite::memory:`) and
    /// create the schema if needed.
    pub async fn connect(url: &str) -> CatalogResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection serialises writers and keeps `:memory:` databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        info!(url, "opened sqlite catalog");
        Ok(catalog)
    }

    /// A fresh private in-memory database.
    pub async fn in_memory() -> CatalogResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> CatalogResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        value: String,
    ) -> CatalogResult<Option<AssetRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM assets WHERE {column} = ?");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn insert(&self, record: &AssetRecord) -> CatalogResult<()> {
        let size = i64::try_from(record.size)
            .map_err(|_| CatalogError::Corrupt(format!("size {} out of range", record.size)))?;
        let result = sqlx::query(
            "INSERT INTO assets (id, file_name, size, mime_type, digest, storage_key, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.logical_name)
        .bind(size)
        .bind(&record.media_type)
        .bind(record.content_digest.to_hex())
        .bind(record.storage_key.as_ref().map(|k| k.as_str().to_string()))
        .bind(record.created_at.timestamp_micros())
        .bind(record.updated_at.timestamp_micros())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation()
                    || db_err.message().contains("UNIQUE constraint") =>
            {
                // SQLite names the column: "UNIQUE constraint failed: assets.digest"
                let message = db_err.message();
                if message.contains("assets.digest") {
                    Err(CatalogError::Conflict {
                        digest: record.content_digest,
                    })
                } else if message.contains("assets.storage_key") {
                    Err(CatalogError::Duplicate {
                        column: "storage_key",
                        value: record
                            .storage_key
                            .as_ref()
                            .map(|k| k.to_string())
                            .unwrap_or_default(),
                    })
                } else {
                    Err(CatalogError::Duplicate {
                        column: "id",
                        value: record.id.to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &AssetId) -> CatalogResult<Option<AssetRecord>> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn get_by_digest(&self, digest: &ContentDigest) -> CatalogResult<Option<AssetRecord>> {
        self.fetch_one_where("digest", digest.to_hex()).await
    }

    async fn get_by_storage_key(&self, key: &BackendKey) -> CatalogResult<Option<AssetRecord>> {
        self.fetch_one_where("storage_key", key.as_str().to_string())
            .await
    }

    async fn delete(&self, id: &AssetId) -> CatalogResult<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_page(&self, limit: usize, offset: usize) -> CatalogResult<Vec<AssetRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM assets ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self) -> CatalogResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn all_storage_keys(&self) -> CatalogResult<Vec<BackendKey>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT storage_key FROM assets WHERE storage_key IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        keys.into_iter()
            .map(|k| BackendKey::new(k).map_err(|e| CatalogError::Corrupt(e.to_string())))
            .collect()
    }
}

impl std::fmt::Debug for SqliteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalog")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

fn corrupt(err: impl std::fmt::Display) -> CatalogError {
    CatalogError::Corrupt(err.to_string())
}

fn timestamp(micros: i64) -> CatalogResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| CatalogError::Corrupt(format!("timestamp {micros} out of range")))
}

fn record_from_row(row: &SqliteRow) -> CatalogResult<AssetRecord> {
    let id: String = row.try_get("id")?;
    let size: i64 = row.try_get("size")?;
    let digest: String = row.try_get("digest")?;
    let storage_key: Option<String> = row.try_get("storage_key")?;

    Ok(AssetRecord {
        id: AssetId::parse(&id).map_err(corrupt)?,
        logical_name: row.try_get("file_name")?,
        size: u64::try_from(size).map_err(corrupt)?,
        media_type: row.try_get("mime_type")?,
        content_digest: ContentDigest::from_hex(&digest).map_err(corrupt)?,
        storage_key: storage_key
            .map(BackendKey::new)
            .transpose()
            .map_err(corrupt)?,
        created_at: timestamp(row.try_get("created_at")?)?,
        updated_at: timestamp(row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use stash_types::MediaType;

    fn record(data: &[u8]) -> AssetRecord {
        AssetRecord::new(
            AssetId::new(),
            ContentDigest::of(data),
            data.len() as u64,
            &MediaType::new("image/png", ".png"),
            None,
        )
    }

    #[tokio::test]
    async fn round_trips_records() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        let rec = record(b"sqlite");
        catalog.insert(&rec).await.unwrap();

        assert_eq!(catalog.get(&rec.id).await.unwrap(), Some(rec.clone()));
        assert_eq!(
            catalog.get_by_digest(&rec.content_digest).await.unwrap(),
            Some(rec)
        );
        assert_eq!(catalog.get(&AssetId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unique_digest_reports_conflict() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        let first = record(b"dup");
        catalog.insert(&first).await.unwrap();

        let err = catalog.insert(&record(b"dup")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { digest } if digest == first.content_digest));
        assert_eq!(catalog.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn storage_key_lookup_and_listing() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        let key = BackendKey::new("3f/0a/x").unwrap();
        let mut placed = record(b"placed");
        placed.storage_key = Some(key.clone());
        catalog.insert(&placed).await.unwrap();
        catalog.insert(&record(b"plain")).await.unwrap();

        assert_eq!(
            catalog.get_by_storage_key(&key).await.unwrap().unwrap().id,
            placed.id
        );
        assert_eq!(catalog.all_storage_keys().await.unwrap(), vec![key.clone()]);

        let mut clash = record(b"clash");
        clash.storage_key = Some(key);
        assert!(matches!(
            catalog.insert(&clash).await.unwrap_err(),
            CatalogError::Duplicate { column: "storage_key", .. }
        ));
    }

    #[tokio::test]
    async fn delete_and_paging() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        let base = Utc::now();
        let mut ids = Vec::new();
        for (i, data) in [b"t1", b"t2", b"t3"].iter().enumerate() {
            let rec = AssetRecord::new_at(
                AssetId::new(),
                ContentDigest::of(*data),
                2,
                &MediaType::octet_stream(),
                None,
                base + ChronoDuration::seconds(i as i64),
            );
            ids.push(rec.id);
            catalog.insert(&rec).await.unwrap();
        }

        let page = catalog.list_page(2, 0).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
        assert_eq!(catalog.count().await.unwrap(), 3);

        assert!(catalog.delete(&ids[2]).await.unwrap());
        assert!(!catalog.delete(&ids[2]).await.unwrap());
        let page = catalog.list_page(10, 0).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);
    }

    #[tokio::test]
    async fn persists_across_reconnects() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());

        let rec = record(b"durable");
        {
            let catalog = SqliteCatalog::connect(&url).await.unwrap();
            catalog.insert(&rec).await.unwrap();
            catalog.pool().close().await;
        }
        let catalog = SqliteCatalog::connect(&url).await.unwrap();
        assert_eq!(catalog.get(&rec.id).await.unwrap(), Some(rec));
        catalog.pool().close().await;
    }
}
