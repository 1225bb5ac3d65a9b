//! Resume text cache, keyed by content hash (spec §4.6, P-CACHE-HIT).

use chrono::Utc;
use jobpulse_core::types::ResumeCacheEntry;
use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};

/// Look up a cached extraction and, on a hit, bump `hit_count`/`last_accessed`.
pub async fn get(pool: &SqlitePool, content_hash: &str) -> Result<Option<ResumeCacheEntry>, JobPulseError> {
    let row = sqlx::query(
        "SELECT content_hash, raw_text, formatted_html, hit_count, last_accessed FROM resume_cache WHERE content_hash = ?",
    )
    .bind(content_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("resume_cache get: {e}")))?;

    let Some(row) = row else { return Ok(None) };
    let entry = row_to_entry(row)?;

    sqlx::query("UPDATE resume_cache SET hit_count = hit_count + 1, last_accessed = ? WHERE content_hash = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(content_hash)
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("resume_cache bump: {e}")))?;

    Ok(Some(entry))
}

pub async fn put(pool: &SqlitePool, content_hash: &str, raw_text: &str, formatted_html: Option<&str>) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO resume_cache (content_hash, raw_text, formatted_html, hit_count, last_accessed)
        VALUES (?, ?, ?, 0, ?)
        ON CONFLICT(content_hash) DO NOTHING
        "#,
    )
    .bind(content_hash)
    .bind(raw_text)
    .bind(formatted_html)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("resume_cache put: {e}")))?;
    Ok(())
}

/// Attach an LLM-formatted HTML rendering to an already-cached entry. Called
/// out of the hot path once formatting completes (spec §4.6 step 4).
pub async fn set_formatted_html(pool: &SqlitePool, content_hash: &str, formatted_html: &str) -> Result<(), JobPulseError> {
    sqlx::query("UPDATE resume_cache SET formatted_html = ? WHERE content_hash = ?")
        .bind(formatted_html)
        .bind(content_hash)
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("resume_cache set_formatted_html: {e}")))?;
    Ok(())
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<ResumeCacheEntry, JobPulseError> {
    let last_accessed: String = row.try_get("last_accessed").map_err(|e| JobPulseError::database(e.to_string()))?;
    Ok(ResumeCacheEntry {
        content_hash: row.try_get("content_hash").map_err(|e| JobPulseError::database(e.to_string()))?,
        raw_text: row.try_get("raw_text").map_err(|e| JobPulseError::database(e.to_string()))?,
        formatted_html: row.try_get("formatted_html").map_err(|e| JobPulseError::database(e.to_string()))?,
        hit_count: row.try_get("hit_count").map_err(|e| JobPulseError::database(e.to_string()))?,
        last_accessed: chrono::DateTime::parse_from_rfc3339(&last_accessed)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| JobPulseError::database(format!("bad timestamp {last_accessed}: {e}")))?,
    })
}
