//! Interval ticker, distributed lock manager and health/self-monitor (spec
//! §4.1, §4.13, §5 — C1 and C13). Knows nothing about vetting, feed
//! publishing or digests; `jobpulse`'s `main.rs` wires concrete
//! [`cycle::CycleHandler`] implementations into [`Scheduler::spawn_cycle`].

pub mod cycle;
pub mod health;
pub mod schedule;

pub use cycle::{CycleHandler, CycleSpec, Scheduler};
pub use health::{CycleStatus, HealthMonitor, HealthSnapshot};
pub use schedule::TickSchedule;
