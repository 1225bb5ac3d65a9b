//! When a cycle fires next (spec §4.1, §5). Two shapes cover every cycle in
//! the system: a fixed interval (vetting, publish) and a once-daily
//! wall-clock time (the digest).

use chrono::{DateTime, NaiveTime, Utc};
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
pub enum TickSchedule {
    Interval(StdDuration),
    DailyAt(NaiveTime),
}

impl TickSchedule {
    /// How long to sleep from `now` until this schedule next fires.
    pub fn next_delay(&self, now: DateTime<Utc>) -> StdDuration {
        match self {
            TickSchedule::Interval(period) => *period,
            TickSchedule::DailyAt(time) => {
                let today_fire = now.date_naive().and_time(*time).and_utc();
                let next_fire = if today_fire > now { today_fire } else { today_fire + chrono::Duration::days(1) };
                (next_fire - now).to_std().unwrap_or(StdDuration::from_secs(1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn interval_schedule_always_waits_a_fixed_period() {
        let schedule = TickSchedule::Interval(StdDuration::from_secs(300));
        assert_eq!(schedule.next_delay(Utc::now()), StdDuration::from_secs(300));
    }

    #[test]
    fn daily_schedule_fires_later_today_when_the_time_has_not_passed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let schedule = TickSchedule::DailyAt(NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        let delay = schedule.next_delay(now);
        assert_eq!(delay, StdDuration::from_secs(5 * 3600));
    }

    #[test]
    fn daily_schedule_rolls_to_tomorrow_once_the_time_has_passed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 14, 0, 0).unwrap();
        let schedule = TickSchedule::DailyAt(NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        let delay = schedule.next_delay(now);
        assert_eq!(delay, StdDuration::from_secs(23 * 3600));
    }
}
