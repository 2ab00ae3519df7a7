//! Calendar cadences that decide when each job fires.

use serde::Serialize;
use time::{Duration, OffsetDateTime, Time, UtcOffset, Weekday, macros::time};

use crate::engine::Job;

/// How often a job fires, as a local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every day at `at`.
    Daily {
        /// The local time of day to fire at.
        at: Time,
    },
    /// Every week on `weekday` at `at`.
    Weekly {
        /// The day of the week to fire on.
        weekday: Weekday,
        /// The local time of day to fire at.
        at: Time,
    },
}

impl Cadence {
    /// The first instant strictly after `now` at which the cadence fires, with wall-clock times
    /// read in `offset`.
    pub fn next_after(&self, now: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
        let local_now = now.to_offset(offset);

        match *self {
            Cadence::Daily { at } => {
                let candidate = local_now.date().with_time(at).assume_offset(offset);

                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Cadence::Weekly { weekday, at } => {
                let days_ahead = (i64::from(weekday.number_days_from_monday())
                    - i64::from(local_now.weekday().number_days_from_monday()))
                .rem_euclid(7);
                let candidate = (local_now.date() + Duration::days(days_ahead))
                    .with_time(at)
                    .assume_offset(offset);

                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::weeks(1)
                }
            }
        }
    }
}

/// A job paired with the cadence it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobSchedule {
    /// The job to run.
    pub job: Job,
    /// When to run it.
    pub cadence: Cadence,
}

/// The production schedule for every job.
pub fn default_schedules() -> Vec<JobSchedule> {
    vec![
        JobSchedule {
            job: Job::RecalculateBalances,
            cadence: Cadence::Daily { at: time!(02:00) },
        },
        JobSchedule {
            job: Job::CheckBudgetAlerts,
            cadence: Cadence::Daily { at: time!(09:00) },
        },
        JobSchedule {
            job: Job::CheckGoalProgress,
            cadence: Cadence::Weekly {
                weekday: Weekday::Monday,
                at: time!(10:00),
            },
        },
        JobSchedule {
            job: Job::CleanupNotifications,
            cadence: Cadence::Weekly {
                weekday: Weekday::Sunday,
                at: time!(03:00),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use time::{
        UtcOffset, Weekday,
        macros::{datetime, offset, time},
    };

    use crate::engine::Job;

    use super::{Cadence, default_schedules};

    const BANGKOK: UtcOffset = offset!(+7);

    #[test]
    fn daily_fires_later_the_same_day() {
        let cadence = Cadence::Daily { at: time!(09:00) };
        // 08:30 in Bangkok.
        let now = datetime!(2025-10-06 01:30 UTC);

        let next = cadence.next_after(now, BANGKOK);

        assert_eq!(next, datetime!(2025-10-06 09:00 +7));
    }

    #[test]
    fn daily_rolls_over_to_tomorrow() {
        let cadence = Cadence::Daily { at: time!(02:00) };
        // 02:00 in Bangkok exactly, which must not fire again.
        let now = datetime!(2025-10-05 19:00 UTC);

        let next = cadence.next_after(now, BANGKOK);

        assert_eq!(next, datetime!(2025-10-07 02:00 +7));
    }

    #[test]
    fn daily_uses_local_date_not_utc_date() {
        let cadence = Cadence::Daily { at: time!(02:00) };
        // 2025-10-05 23:00 UTC is already 06:00 on the 6th in Bangkok.
        let now = datetime!(2025-10-05 23:00 UTC);

        let next = cadence.next_after(now, BANGKOK);

        assert_eq!(next, datetime!(2025-10-07 02:00 +7));
    }

    #[test]
    fn weekly_fires_on_next_matching_weekday() {
        let cadence = Cadence::Weekly {
            weekday: Weekday::Monday,
            at: time!(10:00),
        };
        // Wednesday in Bangkok.
        let now = datetime!(2025-10-08 12:00 +7);

        let next = cadence.next_after(now, BANGKOK);

        assert_eq!(next, datetime!(2025-10-13 10:00 +7));
        assert_eq!(next.weekday(), Weekday::Monday);
    }

    #[test]
    fn weekly_fires_later_the_same_day() {
        let cadence = Cadence::Weekly {
            weekday: Weekday::Sunday,
            at: time!(03:00),
        };
        let now = datetime!(2025-10-12 01:00 +7);

        let next = cadence.next_after(now, BANGKOK);

        assert_eq!(next, datetime!(2025-10-12 03:00 +7));
    }

    #[test]
    fn weekly_skips_a_week_once_the_time_has_passed() {
        let cadence = Cadence::Weekly {
            weekday: Weekday::Sunday,
            at: time!(03:00),
        };
        let now = datetime!(2025-10-12 03:00 +7);

        let next = cadence.next_after(now, BANGKOK);

        assert_eq!(next, datetime!(2025-10-19 03:00 +7));
    }

    #[test]
    fn default_schedules_cover_every_job_once() {
        let schedules = default_schedules();

        let mut jobs: Vec<Job> = schedules.iter().map(|schedule| schedule.job).collect();
        jobs.sort();

        assert_eq!(jobs, Job::ALL.to_vec());
    }
}
