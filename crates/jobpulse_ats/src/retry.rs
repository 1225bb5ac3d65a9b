//! Backoff policy for transient ATS errors (spec §4.2): respect a
//! server-supplied `Retry-After`, otherwise exponential backoff with
//! jitter (base 500ms, cap 30s, max 6 attempts).

use jobpulse_core::JobPulseError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

const BASE: Duration = Duration::from_millis(500);
const CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 6;

pub fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(delay) = retry_after {
        return delay.min(CAP);
    }
    let exp = BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(CAP);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4 + 1);
    capped + Duration::from_millis(jitter_ms)
}

/// Run `op` until it succeeds, returns a non-retryable error, or attempts
/// are exhausted. `op` returns `(result, retry_after)` so callers can
/// surface a server `Retry-After` header on a transient failure.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, JobPulseError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, (JobPulseError, Option<Duration>)>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err((err, retry_after)) => {
                if !err.is_retryable() || attempt + 1 >= MAX_ATTEMPTS {
                    return Err(err);
                }
                let delay = backoff_delay(attempt, retry_after);
                tracing::warn!(attempt, ?delay, error = %err, "retrying ats call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_wins_over_exponential_schedule() {
        let delay = backoff_delay(4, Some(Duration::from_secs(2)));
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[test]
    fn delay_never_exceeds_cap() {
        for attempt in 0..10 {
            assert!(backoff_delay(attempt, None) <= CAP + Duration::from_millis(CAP.as_millis() as u64 / 4 + 1));
        }
    }

    #[tokio::test]
    async fn stops_retrying_on_non_retryable_error() {
        let mut calls = 0;
        let result: Result<(), JobPulseError> = with_retry(|_attempt| {
            calls += 1;
            async { Err::<(), _>((JobPulseError::data("bad payload"), None)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = with_retry(|_attempt| {
            calls += 1;
            let this_call = calls;
            async move {
                if this_call < 3 {
                    Err((JobPulseError::transient("rate limited"), None))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls, 3);
    }
}
