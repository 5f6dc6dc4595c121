//! Storage layer: the SQLite shard ledger.
//!
//! Holds DB pool setup, the migration runner, and the queries over `shards`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}?mode=rwc", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}?mode=rwc", norm);
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies migrations located in crates/storage/migrations; idempotent.
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// One row of the ledger. `status` is one of unprocessed|processing|refined|error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub id: String,
    pub file_name: String,
    pub source_type: String,
    pub status: String,
    pub drive_file_id: Option<String>,
    pub web_view_link: Option<String>,
    pub created_at: String,
}

/// Inserts a shard or refreshes its mutable columns. `created_at` is kept from the first insert.
pub async fn upsert_shard(pool: &SqlitePool, shard: &ShardRecord) -> anyhow::Result<()> {
    let now = Utc::now().to_rfc3339();
    let created = if shard.created_at.is_empty() {
        now.clone()
    } else {
        shard.created_at.clone()
    };
    sqlx::query(
        r#"
        INSERT INTO shards (id, file_name, source_type, status, drive_file_id, web_view_link, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            file_name = excluded.file_name,
            source_type = excluded.source_type,
            status = excluded.status,
            drive_file_id = COALESCE(excluded.drive_file_id, shards.drive_file_id),
            web_view_link = COALESCE(excluded.web_view_link, shards.web_view_link),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&shard.id)
    .bind(&shard.file_name)
    .bind(&shard.source_type)
    .bind(&shard.status)
    .bind(&shard.drive_file_id)
    .bind(&shard.web_view_link)
    .bind(created)
    .bind(now)
    .execute(pool)
    .await?;
    debug!(shard = %shard.id, status = %shard.status, "shard recorded");
    Ok(())
}

/// Ids already handed to the refinery. Shards whose submission failed are left out so they are retried.
pub async fn known_shard_ids(pool: &SqlitePool) -> anyhow::Result<HashSet<String>> {
    let rows = sqlx::query("SELECT id FROM shards WHERE status != 'error'")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
}

pub async fn list_shards(pool: &SqlitePool, status: Option<&str>) -> anyhow::Result<Vec<ShardRecord>> {
    let mut query = sqlx::QueryBuilder::new(
        "SELECT id, file_name, source_type, status, drive_file_id, web_view_link, created_at FROM shards",
    );
    if let Some(s) = status {
        query.push(" WHERE status = ");
        query.push_bind(s);
    }
    query.push(" ORDER BY created_at DESC, id");
    let rows = query.build().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| ShardRecord {
            id: row.get(0),
            file_name: row.get(1),
            source_type: row.get(2),
            status: row.get(3),
            drive_file_id: row.try_get(4).ok().flatten(),
            web_view_link: row.try_get(5).ok().flatten(),
            created_at: row.get(6),
        })
        .collect())
}

/// Returns false when no shard has this id.
pub async fn set_status(pool: &SqlitePool, id: &str, status: &str) -> anyhow::Result<bool> {
    let res = sqlx::query("UPDATE shards SET status = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(id: &str, status: &str) -> ShardRecord {
        ShardRecord {
            id: id.to_string(),
            file_name: format!("{id}.json"),
            source_type: "Amazon".into(),
            status: status.into(),
            drive_file_id: Some(id.trim_start_matches("drive_").to_string()),
            web_view_link: None,
            created_at: String::new(),
        }
    }

    async fn memory_pool() -> SqlitePool {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_created_at() {
        let pool = memory_pool().await;
        upsert_shard(&pool, &shard("drive_a", "processing")).await.unwrap();
        let first = list_shards(&pool, None).await.unwrap();
        upsert_shard(&pool, &shard("drive_a", "refined")).await.unwrap();
        let second = list_shards(&pool, None).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].status, "refined");
        assert_eq!(first[0].created_at, second[0].created_at);
    }

    #[tokio::test]
    async fn known_ids_and_status_filter() {
        let pool = memory_pool().await;
        upsert_shard(&pool, &shard("drive_a", "processing")).await.unwrap();
        upsert_shard(&pool, &shard("drive_b", "error")).await.unwrap();
        let known = known_shard_ids(&pool).await.unwrap();
        assert!(known.contains("drive_a"));
        assert!(!known.contains("drive_b"));
        assert_eq!(list_shards(&pool, Some("error")).await.unwrap().len(), 1);
        assert!(set_status(&pool, "drive_b", "refined").await.unwrap());
        assert!(!set_status(&pool, "drive_missing", "refined").await.unwrap());
        assert!(list_shards(&pool, Some("error")).await.unwrap().is_empty());
        assert!(known_shard_ids(&pool).await.unwrap().contains("drive_b"));
    }
}
