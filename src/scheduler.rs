//! Cron-driven cycle scheduling.
//!
//! Match cycles usually run on a calendar cadence (e.g. monthly, the
//! morning after a networking event). The scheduler polls a cron
//! expression in the community's timezone and emits a message when a run
//! is due; the consumer owns the database handle and drives
//! `MatchPipeline::run_cycle`. Sleep/wake gaps are detected via time
//! jumps, and missed runs fire late while still inside the grace period.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::mpsc;

use crate::error::MatchError;

/// Grace period for firing a missed run (6 hours).
const MISSED_RUN_GRACE_SECS: i64 = 21_600;

/// Time jump threshold that signals the host slept (5 minutes).
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for the scheduler loop (1 minute).
const POLL_INTERVAL_SECS: u64 = 60;

/// Why a cycle run fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Fired at (or within a poll of) its scheduled time.
    Scheduled,
    /// Fired late, after a sleep/wake gap, within the grace period.
    Missed,
}

/// Message sent to the cycle runner.
#[derive(Debug, Clone)]
pub struct ScheduledCycle {
    pub due_at: DateTime<Utc>,
    pub trigger: CycleTrigger,
}

/// Cron-expression scheduler for match cycles.
pub struct CycleScheduler {
    schedule: Schedule,
    timezone: Tz,
    sender: mpsc::Sender<ScheduledCycle>,
}

impl CycleScheduler {
    /// Build a scheduler from a cron expression (seconds field included,
    /// e.g. `"0 0 6 1 * * *"` = 06:00 on the 1st of every month) and an
    /// IANA timezone name.
    pub fn new(
        cron_expr: &str,
        timezone: &str,
        sender: mpsc::Sender<ScheduledCycle>,
    ) -> Result<Self, MatchError> {
        let schedule = Schedule::from_str(cron_expr)
            .map_err(|e| MatchError::Config(format!("invalid cycle cron '{cron_expr}': {e}")))?;
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| MatchError::Config(format!("unknown timezone '{timezone}'")))?;
        Ok(Self {
            schedule,
            timezone,
            sender,
        })
    }

    /// Next scheduled occurrence strictly after `after`.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Run the polling loop until the receiver side is dropped.
    pub async fn run(self) {
        let mut last_check = Utc::now();
        let mut next_due = self.next_occurrence(last_check);

        loop {
            tokio::time::sleep(StdDuration::from_secs(POLL_INTERVAL_SECS)).await;
            let now = Utc::now();

            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for missed cycle runs",
                    time_jump
                );
            }

            if let Some(due) = next_due {
                match classify_due(due, now) {
                    DueState::NotYet => {}
                    DueState::Fire(trigger) => {
                        log::info!("Cycle run due at {} firing ({:?})", due, trigger);
                        if self
                            .sender
                            .send(ScheduledCycle {
                                due_at: due,
                                trigger,
                            })
                            .await
                            .is_err()
                        {
                            log::info!("Cycle runner gone; stopping scheduler");
                            return;
                        }
                        next_due = self.next_occurrence(now);
                    }
                    DueState::Expired => {
                        log::warn!(
                            "Skipping cycle run due at {}: outside the {}h grace period",
                            due,
                            MISSED_RUN_GRACE_SECS / 3600
                        );
                        next_due = self.next_occurrence(now);
                    }
                }
            }

            last_check = now;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DueState {
    NotYet,
    Fire(CycleTrigger),
    Expired,
}

/// Decide what to do with an occurrence relative to the current time.
fn classify_due(due: DateTime<Utc>, now: DateTime<Utc>) -> DueState {
    if due > now {
        return DueState::NotYet;
    }
    let late = now - due;
    if late > Duration::seconds(MISSED_RUN_GRACE_SECS) {
        return DueState::Expired;
    }
    if late > Duration::seconds(POLL_INTERVAL_SECS as i64 * 2) {
        DueState::Fire(CycleTrigger::Missed)
    } else {
        DueState::Fire(CycleTrigger::Scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduler(expr: &str, tz: &str) -> CycleScheduler {
        let (sender, _receiver) = mpsc::channel(4);
        CycleScheduler::new(expr, tz, sender).unwrap()
    }

    #[test]
    fn rejects_bad_cron_and_timezone() {
        let (sender, _receiver) = mpsc::channel(4);
        assert!(CycleScheduler::new("not a cron", "UTC", sender).is_err());

        let (sender, _receiver) = mpsc::channel(4);
        assert!(CycleScheduler::new("0 0 6 1 * * *", "Mars/Olympus", sender).is_err());
    }

    #[test]
    fn monthly_occurrence_in_timezone() {
        // 06:00 on the 1st, New York time.
        let s = scheduler("0 0 6 1 * * *", "America/New_York");
        let after = Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap();
        let next = s.next_occurrence(after).unwrap();
        // 06:00 EST == 11:00 UTC
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn occurrence_is_strictly_after() {
        let s = scheduler("0 0 6 1 * * *", "UTC");
        let exactly_due = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let next = s.next_occurrence(exactly_due).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn due_classification() {
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();

        // Not due yet
        let now = due - Duration::minutes(10);
        assert_eq!(classify_due(due, now), DueState::NotYet);

        // On time
        let now = due + Duration::seconds(30);
        assert_eq!(classify_due(due, now), DueState::Fire(CycleTrigger::Scheduled));

        // Late but inside grace: fires as Missed
        let now = due + Duration::hours(2);
        assert_eq!(classify_due(due, now), DueState::Fire(CycleTrigger::Missed));

        // Too late: skipped
        let now = due + Duration::hours(12);
        assert_eq!(classify_due(due, now), DueState::Expired);
    }
}
