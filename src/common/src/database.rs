use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, Row, SqlitePool, query};
use std::collections::HashSet;

/// A stored draft row.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub entity: String,
    pub entity_id: String,
    pub route: String,
    pub payload: String,
    pub saved_at: DateTime<Utc>,
}

/// A row holding a foreign key to `images.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef {
    /// Primary key of the referencing row (`media.id` or `image_chunks.id`)
    pub id: i64,
    pub image_id: i64,
}

/// ContentDb provides access to the site content database (PostgreSQL or SQLite).
///
/// Only the tables blob maintenance and draft persistence touch are modelled
/// here: `images`, `image_chunks`, `media` and `drafts`.
#[derive(Clone)]
pub enum ContentDb {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl std::fmt::Debug for ContentDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentDb::Postgres(_) => write!(f, "ContentDb::Postgres"),
            ContentDb::Sqlite(_) => write!(f, "ContentDb::Sqlite"),
        }
    }
}

impl ContentDb {
    /// Connect to the content database and create missing tables.
    pub async fn new(dsn: &str) -> Result<Self, sqlx::Error> {
        log::info!("Connecting to content database with DSN: {dsn}");

        let db = if dsn.starts_with("sqlite::memory:") {
            // Every SQLite in-memory connection is its own database, so pin
            // the pool to a single connection that never expires.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(dsn)
                .await?;
            ContentDb::Sqlite(pool)
        } else if dsn.starts_with("sqlite:") {
            // Add mode=rwc to create database file if it doesn't exist
            let dsn_with_create = if dsn.contains('?') {
                if dsn.contains("mode=") {
                    dsn.to_string()
                } else {
                    format!("{dsn}&mode=rwc")
                }
            } else {
                format!("{dsn}?mode=rwc")
            };

            let pool = SqlitePool::connect(&dsn_with_create).await.map_err(|e| {
                log::error!(
                    "Failed to connect to SQLite database with DSN '{dsn_with_create}': {e}"
                );
                e
            })?;
            ContentDb::Sqlite(pool)
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                e
            })?;
            ContentDb::Postgres(pool)
        };

        log::info!("Database connection established successfully");
        db.init().await.map_err(|e| {
            log::error!("Failed to initialize content schema: {e}");
            e
        })?;
        log::info!("Content schema initialized successfully");
        Ok(db)
    }

    /// In-memory SQLite database, used by tests and local runs.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        Self::new("sqlite::memory:").await
    }

    /// Initialize content tables if they do not exist.
    async fn init(&self) -> Result<(), sqlx::Error> {
        match self {
            ContentDb::Sqlite(pool) => {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS images (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        url TEXT,
                        filename TEXT,
                        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS image_chunks (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        image_id INTEGER NOT NULL,
                        chunk_index INTEGER NOT NULL,
                        data BLOB NOT NULL
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS media (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        image_id INTEGER,
                        url TEXT,
                        media_type TEXT NOT NULL,
                        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS drafts (
                        entity TEXT NOT NULL,
                        entity_id TEXT NOT NULL,
                        route TEXT NOT NULL,
                        payload TEXT NOT NULL,
                        saved_at TEXT NOT NULL,
                        PRIMARY KEY (entity, entity_id, route)
                    )"#,
                ];
                for statement in statements {
                    query(statement).execute(pool).await?;
                }
            }
            ContentDb::Postgres(pool) => {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS images (
                        id BIGSERIAL PRIMARY KEY,
                        url TEXT,
                        filename TEXT,
                        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS image_chunks (
                        id BIGSERIAL PRIMARY KEY,
                        image_id BIGINT NOT NULL,
                        chunk_index INT NOT NULL,
                        data BYTEA NOT NULL
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS media (
                        id BIGSERIAL PRIMARY KEY,
                        image_id BIGINT,
                        url TEXT,
                        media_type TEXT NOT NULL,
                        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS drafts (
                        entity TEXT NOT NULL,
                        entity_id TEXT NOT NULL,
                        route TEXT NOT NULL,
                        payload TEXT NOT NULL,
                        saved_at TIMESTAMPTZ NOT NULL,
                        PRIMARY KEY (entity, entity_id, route)
                    )"#,
                ];
                for statement in statements {
                    query(statement).execute(pool).await?;
                }
            }
        }

        Ok(())
    }

    // ── Blob references ─────────────────────────────────────────────────

    /// Distinct non-null `url` values of `images` and `media` that start with
    /// `url_prefix`, i.e. references to blobs in the configured storage.
    pub async fn referenced_blob_urls(
        &self,
        url_prefix: &str,
    ) -> Result<HashSet<String>, sqlx::Error> {
        let sql = r#"
            SELECT url FROM images WHERE url IS NOT NULL
            UNION
            SELECT url FROM media WHERE url IS NOT NULL
        "#;

        let urls: Vec<String> = match self {
            ContentDb::Sqlite(pool) => query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| row.try_get("url"))
                .collect::<Result<_, _>>()?,
            ContentDb::Postgres(pool) => query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| row.try_get("url"))
                .collect::<Result<_, _>>()?,
        };

        Ok(urls
            .into_iter()
            .filter(|url| url.starts_with(url_prefix))
            .collect())
    }

    // ── Content rows ────────────────────────────────────────────────────

    /// Insert an `images` row, returning its id.
    pub async fn insert_image(
        &self,
        url: Option<&str>,
        filename: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = match self {
            ContentDb::Sqlite(pool) => {
                query("INSERT INTO images (url, filename) VALUES (?, ?) RETURNING id")
                    .bind(url)
                    .bind(filename)
                    .fetch_one(pool)
                    .await?
                    .try_get("id")?
            }
            ContentDb::Postgres(pool) => {
                query("INSERT INTO images (url, filename) VALUES ($1, $2) RETURNING id")
                    .bind(url)
                    .bind(filename)
                    .fetch_one(pool)
                    .await?
                    .try_get("id")?
            }
        };
        Ok(id)
    }

    /// Delete an `images` row. Dependent rows are left in place.
    pub async fn delete_image(&self, id: i64) -> Result<bool, sqlx::Error> {
        self.delete_by_id("images", id).await
    }

    pub async fn image_exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        let found = match self {
            ContentDb::Sqlite(pool) => query("SELECT 1 FROM images WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?
                .is_some(),
            ContentDb::Postgres(pool) => query("SELECT 1 FROM images WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?
                .is_some(),
        };
        Ok(found)
    }

    /// Insert a `media` row, returning its id.
    pub async fn insert_media(
        &self,
        image_id: Option<i64>,
        url: Option<&str>,
        media_type: &str,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = match self {
            ContentDb::Sqlite(pool) => query(
                "INSERT INTO media (image_id, url, media_type) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(image_id)
            .bind(url)
            .bind(media_type)
            .fetch_one(pool)
            .await?
            .try_get("id")?,
            ContentDb::Postgres(pool) => query(
                "INSERT INTO media (image_id, url, media_type) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(image_id)
            .bind(url)
            .bind(media_type)
            .fetch_one(pool)
            .await?
            .try_get("id")?,
        };
        Ok(id)
    }

    /// `media` rows that point at an image.
    pub async fn media_image_refs(&self) -> Result<Vec<ImageRef>, sqlx::Error> {
        let sql = "SELECT id, image_id FROM media WHERE image_id IS NOT NULL ORDER BY id";
        self.image_refs(sql).await
    }

    pub async fn delete_media(&self, id: i64) -> Result<bool, sqlx::Error> {
        self.delete_by_id("media", id).await
    }

    /// Insert an `image_chunks` row, returning its id.
    pub async fn insert_image_chunk(
        &self,
        image_id: i64,
        chunk_index: i32,
        data: &[u8],
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = match self {
            ContentDb::Sqlite(pool) => query(
                "INSERT INTO image_chunks (image_id, chunk_index, data) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(image_id)
            .bind(chunk_index)
            .bind(data)
            .fetch_one(pool)
            .await?
            .try_get("id")?,
            ContentDb::Postgres(pool) => query(
                "INSERT INTO image_chunks (image_id, chunk_index, data) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(image_id)
            .bind(chunk_index)
            .bind(data)
            .fetch_one(pool)
            .await?
            .try_get("id")?,
        };
        Ok(id)
    }

    /// `image_chunks` rows with their parent image id.
    pub async fn image_chunk_refs(&self) -> Result<Vec<ImageRef>, sqlx::Error> {
        let sql = "SELECT id, image_id FROM image_chunks ORDER BY id";
        self.image_refs(sql).await
    }

    pub async fn delete_image_chunk(&self, id: i64) -> Result<bool, sqlx::Error> {
        self.delete_by_id("image_chunks", id).await
    }

    async fn image_refs(&self, sql: &str) -> Result<Vec<ImageRef>, sqlx::Error> {
        let pairs: Vec<(i64, i64)> = match self {
            ContentDb::Sqlite(pool) => query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| Ok((row.try_get("id")?, row.try_get("image_id")?)))
                .collect::<Result<_, sqlx::Error>>()?,
            ContentDb::Postgres(pool) => query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| Ok((row.try_get("id")?, row.try_get("image_id")?)))
                .collect::<Result<_, sqlx::Error>>()?,
        };

        Ok(pairs
            .into_iter()
            .map(|(id, image_id)| ImageRef { id, image_id })
            .collect())
    }

    /// `table` is always one of our own table names, never caller input.
    async fn delete_by_id(&self, table: &str, id: i64) -> Result<bool, sqlx::Error> {
        let affected = match self {
            ContentDb::Sqlite(pool) => {
                let sql = format!("DELETE FROM {table} WHERE id = ?");
                query(&sql).bind(id).execute(pool).await?.rows_affected()
            }
            ContentDb::Postgres(pool) => {
                let sql = format!("DELETE FROM {table} WHERE id = $1");
                query(&sql).bind(id).execute(pool).await?.rows_affected()
            }
        };
        Ok(affected > 0)
    }

    // ── Drafts ──────────────────────────────────────────────────────────

    /// Insert or replace a draft.
    pub async fn upsert_draft(&self, draft: &DraftRecord) -> Result<(), sqlx::Error> {
        match self {
            ContentDb::Sqlite(pool) => {
                let stmt = r#"
                INSERT INTO drafts (entity, entity_id, route, payload, saved_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (entity, entity_id, route)
                DO UPDATE SET payload = excluded.payload, saved_at = excluded.saved_at
                "#;
                query(stmt)
                    .bind(&draft.entity)
                    .bind(&draft.entity_id)
                    .bind(&draft.route)
                    .bind(&draft.payload)
                    .bind(draft.saved_at)
                    .execute(pool)
                    .await?;
            }
            ContentDb::Postgres(pool) => {
                let stmt = r#"
                INSERT INTO drafts (entity, entity_id, route, payload, saved_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (entity, entity_id, route)
                DO UPDATE SET payload = EXCLUDED.payload, saved_at = EXCLUDED.saved_at
                "#;
                query(stmt)
                    .bind(&draft.entity)
                    .bind(&draft.entity_id)
                    .bind(&draft.route)
                    .bind(&draft.payload)
                    .bind(draft.saved_at)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn get_draft(
        &self,
        entity: &str,
        entity_id: &str,
        route: &str,
    ) -> Result<Option<DraftRecord>, sqlx::Error> {
        let row = match self {
            ContentDb::Sqlite(pool) => {
                query(
                    "SELECT payload, saved_at FROM drafts WHERE entity = ? AND entity_id = ? AND route = ?",
                )
                .bind(entity)
                .bind(entity_id)
                .bind(route)
                .fetch_optional(pool)
                .await?
                .map(|row| -> Result<_, sqlx::Error> {
                    Ok((row.try_get::<String, _>("payload")?, row.try_get::<DateTime<Utc>, _>("saved_at")?))
                })
            }
            ContentDb::Postgres(pool) => {
                query(
                    "SELECT payload, saved_at FROM drafts WHERE entity = $1 AND entity_id = $2 AND route = $3",
                )
                .bind(entity)
                .bind(entity_id)
                .bind(route)
                .fetch_optional(pool)
                .await?
                .map(|row| -> Result<_, sqlx::Error> {
                    Ok((row.try_get::<String, _>("payload")?, row.try_get::<DateTime<Utc>, _>("saved_at")?))
                })
            }
        };

        match row {
            Some(result) => {
                let (payload, saved_at) = result?;
                Ok(Some(DraftRecord {
                    entity: entity.to_string(),
                    entity_id: entity_id.to_string(),
                    route: route.to_string(),
                    payload,
                    saved_at,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_draft(
        &self,
        entity: &str,
        entity_id: &str,
        route: &str,
    ) -> Result<bool, sqlx::Error> {
        let affected = match self {
            ContentDb::Sqlite(pool) => {
                query("DELETE FROM drafts WHERE entity = ? AND entity_id = ? AND route = ?")
                    .bind(entity)
                    .bind(entity_id)
                    .bind(route)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
            ContentDb::Postgres(pool) => {
                query("DELETE FROM drafts WHERE entity = $1 AND entity_id = $2 AND route = $3")
                    .bind(entity)
                    .bind(entity_id)
                    .bind(route)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    /// Delete every draft, returning the number removed.
    pub async fn delete_all_drafts(&self) -> Result<u64, sqlx::Error> {
        let affected = match self {
            ContentDb::Sqlite(pool) => query("DELETE FROM drafts")
                .execute(pool)
                .await?
                .rows_affected(),
            ContentDb::Postgres(pool) => query("DELETE FROM drafts")
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }
}
