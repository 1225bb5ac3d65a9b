//! Interval ticker and distributed lock manager (spec §4.1, §5, C1).
//!
//! Every cycle (vetting, publish, digest) runs the same shape: wait for the
//! next tick, try to claim a TTL-scoped lock, and if it's held elsewhere
//! skip this tick rather than queueing — a missed cycle just runs on the
//! next tick with a fresh detection pass. A background task renews the
//! lease at a third of its TTL while the handler runs so a slow-but-alive
//! handler is never pre-empted by its own lease expiring.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::health::HealthMonitor;
use crate::schedule::TickSchedule;

/// A unit of recurring work the scheduler drives. Implementations hold
/// whatever `Arc`-shared clients and pool handles they need; the scheduler
/// itself knows nothing about vetting, publishing or digests.
#[async_trait]
pub trait CycleHandler: Send + Sync + 'static {
    async fn run(&self) -> Result<(), JobPulseError>;
}

pub struct CycleSpec {
    pub name: &'static str,
    pub schedule: TickSchedule,
    /// Nominal runtime under normal load. Drives both the lock TTL (1.5x)
    /// and the stuck-cycle health signal (3x), per spec §5 and §4.13.
    pub expected_runtime: ChronoDuration,
}

/// Drives any number of independent cycle loops against one lock table and
/// one shared health monitor. One `Scheduler` per process; `environment`
/// scopes its locks so staging and prod replicas never contend.
pub struct Scheduler {
    pool: SqlitePool,
    environment: String,
    owner_id: String,
    health: Arc<HealthMonitor>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, environment: impl Into<String>) -> Self {
        Scheduler {
            pool,
            environment: environment.into(),
            owner_id: format!("jobpulse-{}", uuid::Uuid::new_v4()),
            health: Arc::new(HealthMonitor::new()),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        self.health.clone()
    }

    /// Register and start one cycle's loop. Returns immediately; the loop
    /// runs on its own task until `stop` is called.
    pub fn spawn_cycle(&mut self, spec: CycleSpec, handler: Arc<dyn CycleHandler>) {
        self.health.register_cycle(spec.name, spec.expected_runtime);

        let pool = self.pool.clone();
        let environment = self.environment.clone();
        let owner_id = self.owner_id.clone();
        let health = self.health.clone();
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(run_cycle_loop(
            pool,
            environment,
            owner_id,
            spec.name,
            spec.schedule,
            spec.expected_runtime,
            handler,
            health,
            shutdown,
        ));
        self.tasks.push(task);
    }

    /// Ask every cycle loop to stop taking new ticks, then wait up to
    /// `grace` total for in-flight handlers to finish. A handler still
    /// running past `grace` is left to finish on its own; the process exit
    /// does not forcibly kill it, matching the panic-safe, never-corrupt
    /// posture of the rest of the cycle loop.
    pub async fn stop(self, grace: StdDuration) {
        self.shutdown.cancel();
        let deadline = tokio::time::Instant::now() + grace;
        for task in self.tasks {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, task).await.is_err() {
                warn!("a cycle task did not finish within the shutdown grace period");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_cycle_loop(
    pool: SqlitePool,
    environment: String,
    owner_id: String,
    name: &'static str,
    schedule: TickSchedule,
    expected_runtime: ChronoDuration,
    handler: Arc<dyn CycleHandler>,
    health: Arc<HealthMonitor>,
    shutdown: CancellationToken,
) {
    let ttl = scale_duration(expected_runtime, 1.5);
    let renew_interval = (ttl / 3).to_std().unwrap_or(StdDuration::from_secs(30));

    loop {
        let delay = schedule.next_delay(Utc::now());
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(cycle = name, "shutdown requested, stopping cycle loop");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if shutdown.is_cancelled() {
            return;
        }

        run_one_tick(&pool, &environment, &owner_id, name, ttl, renew_interval, &handler, &health).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one_tick(
    pool: &SqlitePool,
    environment: &str,
    owner_id: &str,
    name: &'static str,
    ttl: ChronoDuration,
    renew_interval: StdDuration,
    handler: &Arc<dyn CycleHandler>,
    health: &Arc<HealthMonitor>,
) {
    let claim_at = Utc::now();
    let claimed = match jobpulse_db::scheduler_lock::claim(pool, name, environment, owner_id, ttl, claim_at).await {
        Ok(claimed) => claimed,
        Err(e) => {
            warn!(cycle = name, error = %e, "could not evaluate scheduler lock, skipping this tick");
            return;
        }
    };

    if !claimed {
        debug!(cycle = name, "lock held by another replica, skipping this tick");
        return;
    }

    health.mark_started(name, claim_at);

    let renewal_cancel = CancellationToken::new();
    let renewal_task = spawn_renewal(pool.clone(), environment.to_string(), owner_id.to_string(), name, ttl, renew_interval, renewal_cancel.clone());

    let handler = handler.clone();
    let run_result = tokio::spawn(async move { handler.run().await }).await;

    renewal_cancel.cancel();
    let _ = renewal_task.await;

    let finished_at = Utc::now();
    let error_message = describe_outcome(name, &run_result);
    health.mark_finished(name, finished_at, error_message);

    if let Err(e) = jobpulse_db::scheduler_lock::release(pool, name, environment, owner_id).await {
        warn!(cycle = name, error = %e, "failed to release scheduler lock after cycle run");
    }
}

fn spawn_renewal(
    pool: SqlitePool,
    environment: String,
    owner_id: String,
    name: &'static str,
    ttl: ChronoDuration,
    renew_interval: StdDuration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(renew_interval) => {}
            }
            let now = Utc::now();
            match jobpulse_db::scheduler_lock::renew(&pool, name, &environment, &owner_id, ttl, now).await {
                Ok(true) => {}
                Ok(false) => warn!(cycle = name, "lost scheduler lock to another replica mid-run"),
                Err(e) => warn!(cycle = name, error = %e, "failed to renew scheduler lock"),
            }
        }
    })
}

fn describe_outcome(name: &str, result: &Result<Result<(), JobPulseError>, tokio::task::JoinError>) -> Option<String> {
    match result {
        Ok(Ok(())) => {
            info!(cycle = name, "cycle run completed");
            None
        }
        Ok(Err(e)) => {
            error!(cycle = name, error = %e, "cycle run returned an error");
            Some(e.to_string())
        }
        Err(join_err) if join_err.is_panic() => {
            error!(cycle = name, "cycle handler panicked");
            Some(format!("handler panicked: {join_err}"))
        }
        Err(join_err) => {
            error!(cycle = name, error = %join_err, "cycle handler task did not complete");
            Some(join_err.to_string())
        }
    }
}

fn scale_duration(duration: ChronoDuration, factor: f64) -> ChronoDuration {
    ChronoDuration::milliseconds((duration.num_milliseconds() as f64 * factor) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobpulse_db::pool::open;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl CycleHandler for CountingHandler {
        async fn run(&self) -> Result<(), JobPulseError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl CycleHandler for PanickingHandler {
        async fn run(&self) -> Result<(), JobPulseError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn a_single_tick_claims_runs_and_releases_the_lock() {
        let pool = open("sqlite::memory:").await.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn CycleHandler> = Arc::new(CountingHandler(counter.clone()));
        let health = Arc::new(HealthMonitor::new());
        health.register_cycle("test-cycle", ChronoDuration::seconds(1));

        run_one_tick(&pool, "test", "owner-a", "test-cycle", ChronoDuration::seconds(2), StdDuration::from_millis(500), &handler, &health).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let held = jobpulse_db::scheduler_lock::claim(&pool, "test-cycle", "test", "owner-b", ChronoDuration::seconds(2), Utc::now()).await.unwrap();
        assert!(held, "lock should have been released after the tick completed");
    }

    #[tokio::test]
    async fn a_panicking_handler_is_recorded_as_an_error_not_a_crash() {
        let pool = open("sqlite::memory:").await.unwrap();
        let handler: Arc<dyn CycleHandler> = Arc::new(PanickingHandler);
        let health = Arc::new(HealthMonitor::new());
        health.register_cycle("panicky", ChronoDuration::seconds(1));

        run_one_tick(&pool, "test", "owner-a", "panicky", ChronoDuration::seconds(2), StdDuration::from_millis(500), &handler, &health).await;

        let snapshot = health.snapshot(Utc::now());
        let cycle = snapshot.cycles.iter().find(|c| c.name == "panicky").unwrap();
        assert_eq!(cycle.consecutive_failures, 1);
        assert!(cycle.last_error.is_some());
    }

    #[tokio::test]
    async fn a_lock_held_by_another_owner_causes_a_skip() {
        let pool = open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        jobpulse_db::scheduler_lock::claim(&pool, "busy-cycle", "test", "owner-other", ChronoDuration::minutes(5), now).await.unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn CycleHandler> = Arc::new(CountingHandler(counter.clone()));
        let health = Arc::new(HealthMonitor::new());
        health.register_cycle("busy-cycle", ChronoDuration::seconds(1));

        run_one_tick(&pool, "test", "owner-mine", "busy-cycle", ChronoDuration::seconds(2), StdDuration::from_millis(500), &handler, &health).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0, "handler must not run when another owner holds the lock");
    }
}
