//! Distributed TTL-based scheduler lock (spec §5, P-LOCK). Cooperative only:
//! a replica holding an expired lease can have its row reclaimed by another
//! replica, so handlers must tolerate being interrupted mid-cycle.

use chrono::{DateTime, Duration, Utc};
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;

/// Attempt to claim `cycle_name` for `environment`. Succeeds if no row
/// exists, or the existing row's lease has expired. Returns `true` on a
/// successful claim.
pub async fn claim(
    pool: &SqlitePool,
    cycle_name: &str,
    environment: &str,
    owner_id: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<bool, JobPulseError> {
    let expires_at = now + ttl;

    let mut tx = pool.begin().await.map_err(|e| JobPulseError::database(format!("claim begin: {e}")))?;

    let existing_expires: Option<String> = sqlx::query_scalar(
        "SELECT expires_at FROM scheduler_locks WHERE cycle_name = ? AND environment = ?",
    )
    .bind(cycle_name)
    .bind(environment)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| JobPulseError::database(format!("claim lookup: {e}")))?;

    let lease_is_free = match existing_expires {
        None => true,
        Some(raw) => parse_ts(&raw)? <= now,
    };

    if !lease_is_free {
        tx.commit().await.map_err(|e| JobPulseError::database(e.to_string()))?;
        return Ok(false);
    }

    let rows_affected = sqlx::query(
        r#"
        INSERT INTO scheduler_locks (cycle_name, environment, owner_id, acquired_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(cycle_name, environment) DO UPDATE SET
            owner_id = excluded.owner_id,
            acquired_at = excluded.acquired_at,
            expires_at = excluded.expires_at
        WHERE scheduler_locks.expires_at <= ?
        "#,
    )
    .bind(cycle_name)
    .bind(environment)
    .bind(owner_id)
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(|e| JobPulseError::database(format!("claim insert: {e}")))?
    .rows_affected();

    tx.commit().await.map_err(|e| JobPulseError::database(e.to_string()))?;
    Ok(rows_affected > 0)
}

/// Extend the lease for a lock this owner currently holds. Returns `false`
/// if the lock is no longer held by `owner_id` (lost to another replica).
pub async fn renew(
    pool: &SqlitePool,
    cycle_name: &str,
    environment: &str,
    owner_id: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<bool, JobPulseError> {
    let expires_at = now + ttl;
    let rows_affected = sqlx::query(
        "UPDATE scheduler_locks SET expires_at = ? WHERE cycle_name = ? AND environment = ? AND owner_id = ?",
    )
    .bind(expires_at.to_rfc3339())
    .bind(cycle_name)
    .bind(environment)
    .bind(owner_id)
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("renew: {e}")))?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Release a held lock early, e.g. after a cycle completes well before its TTL.
pub async fn release(pool: &SqlitePool, cycle_name: &str, environment: &str, owner_id: &str) -> Result<(), JobPulseError> {
    sqlx::query("DELETE FROM scheduler_locks WHERE cycle_name = ? AND environment = ? AND owner_id = ?")
        .bind(cycle_name)
        .bind(environment)
        .bind(owner_id)
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("release: {e}")))?;
    Ok(())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, JobPulseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobPulseError::database(format!("bad timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    #[tokio::test]
    async fn second_replica_cannot_claim_a_live_lease() {
        let pool = open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        assert!(claim(&pool, "vetting", "prod", "replica-a", Duration::minutes(5), now).await.unwrap());
        assert!(!claim(&pool, "vetting", "prod", "replica-b", Duration::minutes(5), now).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_reclaimed() {
        let pool = open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        assert!(claim(&pool, "vetting", "prod", "replica-a", Duration::seconds(1), now).await.unwrap());

        let later = now + Duration::seconds(2);
        assert!(claim(&pool, "vetting", "prod", "replica-b", Duration::minutes(5), later).await.unwrap());
    }

    #[tokio::test]
    async fn renew_fails_once_another_replica_holds_the_lock() {
        let pool = open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        claim(&pool, "publish", "prod", "replica-a", Duration::seconds(1), now).await.unwrap();

        let later = now + Duration::seconds(2);
        claim(&pool, "publish", "prod", "replica-b", Duration::minutes(5), later).await.unwrap();

        let renewed = renew(&pool, "publish", "prod", "replica-a", Duration::minutes(5), later).await.unwrap();
        assert!(!renewed);
    }

    #[tokio::test]
    async fn locks_are_scoped_per_environment() {
        let pool = open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        assert!(claim(&pool, "vetting", "staging", "replica-a", Duration::minutes(5), now).await.unwrap());
        assert!(claim(&pool, "vetting", "prod", "replica-b", Duration::minutes(5), now).await.unwrap());
    }
}
