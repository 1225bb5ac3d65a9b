//! Delivery dedup ledger (spec §4.11, P-ONE-NOTE, P-ONE-EMAIL). Each channel
//! has its own lookback window: notes dedup over 24h, emails over 5 minutes.

use chrono::{DateTime, Duration, Utc};
use jobpulse_core::types::{DeliveryChannel, DeliveryLedgerEntry, DeliveryStatus};
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;

/// True if a `Sent` entry for `(channel, dedup_key)` exists within `window` of `now`.
pub async fn has_recent(
    pool: &SqlitePool,
    channel: DeliveryChannel,
    dedup_key: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<bool, JobPulseError> {
    let cutoff = now - window;
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM delivery_ledger
        WHERE channel = ? AND dedup_key = ? AND status = 'sent' AND sent_at >= ?
        "#,
    )
    .bind(channel.as_str())
    .bind(dedup_key)
    .bind(cutoff.to_rfc3339())
    .fetch_one(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("has_recent: {e}")))?;

    Ok(row.0 > 0)
}

pub async fn record(pool: &SqlitePool, entry: &DeliveryLedgerEntry) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO delivery_ledger (channel, dedup_key, sent_at, external_id, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.channel.as_str())
    .bind(&entry.key)
    .bind(entry.sent_at.to_rfc3339())
    .bind(&entry.external_id)
    .bind(status_str(entry.status))
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("ledger record: {e}")))?;
    Ok(())
}

fn status_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Sent => "sent",
        DeliveryStatus::DedupSkipped => "dedup_skipped",
        DeliveryStatus::Failed => "failed",
    }
}
