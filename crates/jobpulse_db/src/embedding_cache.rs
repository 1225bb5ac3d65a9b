//! Job description embedding cache, invalidated by description hash (spec §4.7).

use jobpulse_core::types::EmbeddingCacheEntry;
use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};

pub async fn get(pool: &SqlitePool, job_id: &str, description_hash: &str) -> Result<Option<EmbeddingCacheEntry>, JobPulseError> {
    let row = sqlx::query("SELECT job_id, description_hash, vector FROM embedding_cache WHERE job_id = ? AND description_hash = ?")
        .bind(job_id)
        .bind(description_hash)
        .fetch_optional(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("embedding_cache get: {e}")))?;

    row.map(row_to_entry).transpose()
}

pub async fn put(pool: &SqlitePool, entry: &EmbeddingCacheEntry) -> Result<(), JobPulseError> {
    let vector_json = serde_json::to_string(&entry.vector).map_err(|e| JobPulseError::data(e.to_string()))?;
    sqlx::query(
        r#"
        INSERT INTO embedding_cache (job_id, description_hash, vector)
        VALUES (?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            description_hash = excluded.description_hash,
            vector = excluded.vector
        "#,
    )
    .bind(&entry.job_id)
    .bind(&entry.description_hash)
    .bind(vector_json)
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("embedding_cache put: {e}")))?;
    Ok(())
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<EmbeddingCacheEntry, JobPulseError> {
    let vector_json: String = row.try_get("vector").map_err(|e| JobPulseError::database(e.to_string()))?;
    Ok(EmbeddingCacheEntry {
        job_id: row.try_get("job_id").map_err(|e| JobPulseError::database(e.to_string()))?,
        description_hash: row.try_get("description_hash").map_err(|e| JobPulseError::database(e.to_string()))?,
        vector: serde_json::from_str(&vector_json).map_err(|e| JobPulseError::data(e.to_string()))?,
    })
}
