use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::models::{DocumentRecord, NewDocumentRecord};

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert or replace the fingerprint record for a document
    #[inline]
    pub async fn upsert(pool: &SqlitePool, record: NewDocumentRecord) -> Result<DocumentRecord> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO documents (id, category, fingerprint, chunk_count, indexed_date)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 category = excluded.category,
                 fingerprint = excluded.fingerprint,
                 chunk_count = excluded.chunk_count,
                 indexed_date = excluded.indexed_date",
        )
        .bind(&record.id)
        .bind(&record.category)
        .bind(&record.fingerprint)
        .bind(record.chunk_count)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert document record")?;

        Self::get_by_id(pool, &record.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted document record"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRecord>> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, category, fingerprint, chunk_count, indexed_date
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document record by id")?;

        Ok(record)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<DocumentRecord>> {
        let records = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, category, fingerprint, chunk_count, indexed_date
             FROM documents ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list document records")?;

        Ok(records)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document record")?;

        let deleted = result.rows_affected() > 0;
        debug!("Deleted document record {}: {}", id, deleted);
        Ok(deleted)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to count document records")?;

        Ok(count)
    }
}
