//! In-memory health and self-monitor state (spec §4.13, C13). Nothing here
//! is persisted: a restart starts from a clean slate, which is correct
//! since "alive" and "ready" are properties of the running process, not of
//! history. The only durable trace of a cycle's execution is the lock row
//! itself (`jobpulse_db::scheduler_lock`) and whatever domain rows the
//! handler wrote.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct CycleHealth {
    expected_runtime: Duration,
    running: bool,
    last_started: Option<DateTime<Utc>>,
    last_finished: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

/// Point-in-time view returned to the health endpoint handlers.
#[derive(Debug, Clone)]
pub struct CycleStatus {
    pub name: String,
    pub running: bool,
    /// Holding its lock (by wall clock since `last_started`) beyond 3x the
    /// expected runtime. Indicates a handler is wedged, not merely slow.
    pub stuck: bool,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// The process is up and the scheduler loop is running at all.
    pub alive: bool,
    /// Every registered external-service probe last reported reachable.
    pub ready: bool,
    /// `ready` and no cycle is stuck and no cycle's last run ended fatal.
    pub healthy: bool,
    pub cycles: Vec<CycleStatus>,
    pub probes: BTreeMap<String, bool>,
}

/// Shared, thread-safe health state. One instance per process, handed to
/// every cycle loop and to the HTTP health endpoints.
pub struct HealthMonitor {
    cycles: RwLock<BTreeMap<String, CycleHealth>>,
    probes: RwLock<BTreeMap<String, bool>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        HealthMonitor { cycles: RwLock::new(BTreeMap::new()), probes: RwLock::new(BTreeMap::new()) }
    }

    pub fn register_cycle(&self, name: &str, expected_runtime: Duration) {
        let mut cycles = self.cycles.write().expect("health monitor lock poisoned");
        cycles.insert(
            name.to_string(),
            CycleHealth {
                expected_runtime,
                running: false,
                last_started: None,
                last_finished: None,
                last_error: None,
                consecutive_failures: 0,
            },
        );
    }

    pub fn mark_started(&self, name: &str, now: DateTime<Utc>) {
        let mut cycles = self.cycles.write().expect("health monitor lock poisoned");
        if let Some(cycle) = cycles.get_mut(name) {
            cycle.running = true;
            cycle.last_started = Some(now);
        }
    }

    /// Record a cycle's outcome. `error` is `None` on success, or a rendered
    /// error message (or panic message) on failure.
    pub fn mark_finished(&self, name: &str, now: DateTime<Utc>, error: Option<String>) {
        let mut cycles = self.cycles.write().expect("health monitor lock poisoned");
        if let Some(cycle) = cycles.get_mut(name) {
            cycle.running = false;
            cycle.last_finished = Some(now);
            match error {
                Some(msg) => {
                    cycle.consecutive_failures += 1;
                    cycle.last_error = Some(msg);
                }
                None => {
                    cycle.consecutive_failures = 0;
                    cycle.last_error = None;
                }
            }
        }
    }

    /// Record whether an external-service probe (database, ATS auth, ...)
    /// last succeeded. Readiness is the conjunction of every probe set here.
    pub fn set_probe(&self, name: &str, ok: bool) {
        let mut probes = self.probes.write().expect("health monitor lock poisoned");
        probes.insert(name.to_string(), ok);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let cycles_guard = self.cycles.read().expect("health monitor lock poisoned");
        let probes_guard = self.probes.read().expect("health monitor lock poisoned");

        let cycles: Vec<CycleStatus> = cycles_guard
            .iter()
            .map(|(name, health)| {
                let stuck = health.running
                    && health
                        .last_started
                        .map(|started| now - started > health.expected_runtime * 3)
                        .unwrap_or(false);
                CycleStatus {
                    name: name.clone(),
                    running: health.running,
                    stuck,
                    last_started: health.last_started,
                    last_finished: health.last_finished,
                    last_error: health.last_error.clone(),
                    consecutive_failures: health.consecutive_failures,
                }
            })
            .collect();

        let ready = probes_guard.values().all(|ok| *ok);
        let no_stuck = cycles.iter().all(|c| !c.stuck);
        let no_hard_failure = cycles.iter().all(|c| c.consecutive_failures < 3);

        HealthSnapshot { alive: true, ready, healthy: ready && no_stuck && no_hard_failure, cycles, probes: probes_guard.clone() }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_monitor_with_no_probes_is_ready_by_vacuous_truth() {
        let monitor = HealthMonitor::new();
        let snapshot = monitor.snapshot(Utc::now());
        assert!(snapshot.alive);
        assert!(snapshot.ready);
        assert!(snapshot.healthy);
    }

    #[test]
    fn a_failed_probe_makes_the_process_not_ready() {
        let monitor = HealthMonitor::new();
        monitor.set_probe("database", true);
        monitor.set_probe("ats_auth", false);
        let snapshot = monitor.snapshot(Utc::now());
        assert!(!snapshot.ready);
        assert!(!snapshot.healthy);
    }

    #[test]
    fn a_cycle_running_past_three_times_its_expected_runtime_is_stuck() {
        let monitor = HealthMonitor::new();
        monitor.register_cycle("vetting", Duration::minutes(5));
        let started = Utc::now() - Duration::minutes(16);
        monitor.mark_started("vetting", started);

        let snapshot = monitor.snapshot(Utc::now());
        let cycle = snapshot.cycles.iter().find(|c| c.name == "vetting").unwrap();
        assert!(cycle.stuck);
        assert!(!snapshot.healthy);
    }

    #[test]
    fn three_consecutive_failures_mark_the_process_unhealthy_even_when_idle() {
        let monitor = HealthMonitor::new();
        monitor.register_cycle("publish", Duration::minutes(2));
        for _ in 0..3 {
            monitor.mark_started("publish", Utc::now());
            monitor.mark_finished("publish", Utc::now(), Some("boom".into()));
        }
        let snapshot = monitor.snapshot(Utc::now());
        assert!(!snapshot.healthy);
    }
}
