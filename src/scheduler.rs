//! Fires jobs on their calendar cadence until shutdown.

use std::future::Future;

use time::OffsetDateTime;
use tokio::{signal, sync::watch, task::JoinSet};

use crate::{
    Error,
    engine::{Engine, JobReport},
    schedule::{Cadence, JobSchedule},
    timezone::get_offset_at,
};

/// Runs every scheduled job on its own task.
#[derive(Debug, Clone)]
pub struct Scheduler {
    engine: Engine,
    timezone: String,
    schedules: Vec<JobSchedule>,
}

impl Scheduler {
    /// Create a scheduler that evaluates `schedules` in `timezone`.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] if `timezone` is not a known timezone.
    pub fn new(engine: Engine, timezone: &str, schedules: Vec<JobSchedule>) -> Result<Self, Error> {
        get_offset_at(timezone, OffsetDateTime::now_utc())?;

        Ok(Self {
            engine,
            timezone: timezone.to_owned(),
            schedules,
        })
    }

    /// Run the schedules until `shutdown` completes.
    ///
    /// Jobs that are mid-run when `shutdown` completes are allowed to finish.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let (stop_sender, stop_receiver) = watch::channel(false);
        let mut tasks = JoinSet::new();

        for schedule in self.schedules {
            tracing::info!("Scheduling job {} on {:?}", schedule.job, schedule.cadence);

            tasks.spawn(run_schedule(
                self.engine.clone(),
                self.timezone.clone(),
                schedule,
                stop_receiver.clone(),
            ));
        }

        shutdown.await;
        tracing::info!("Shutting down scheduler.");
        stop_sender.send_replace(true);

        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                tracing::error!("A scheduled job task did not finish cleanly: {error}");
            }
        }
    }
}

async fn run_schedule(
    engine: Engine,
    timezone: String,
    schedule: JobSchedule,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let now = OffsetDateTime::now_utc();
        let next_run = match next_fire_time(&schedule.cadence, &timezone, now) {
            Ok(next_run) => next_run,
            Err(error) => {
                tracing::error!("Could not schedule job {}: {error}", schedule.job);
                return;
            }
        };

        let wait = std::time::Duration::try_from(next_run - now).unwrap_or_default();
        tracing::debug!("Next run of job {} at {next_run}", schedule.job);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {},
            _ = stop.changed() => return,
        }

        match engine.run(schedule.job, OffsetDateTime::now_utc()).await {
            Ok(report) => log_report(&report),
            Err(error) => tracing::error!("Job {} did not run: {error}", schedule.job),
        }
    }
}

/// The next instant after `now` that `cadence` fires at in `timezone`.
///
/// The wall-clock time is placed using the offset in force at the fire time itself, so a fire
/// time on the far side of a daylight saving change is not shifted by an hour.
fn next_fire_time(
    cadence: &Cadence,
    timezone: &str,
    now: OffsetDateTime,
) -> Result<OffsetDateTime, Error> {
    let offset = get_offset_at(timezone, now)?;
    let candidate = cadence.next_after(now, offset);

    let candidate_offset = get_offset_at(timezone, candidate)?;
    if candidate_offset == offset {
        return Ok(candidate);
    }

    Ok(cadence.next_after(now, candidate_offset))
}

fn log_report(report: &JobReport) {
    if report.failures.is_empty() {
        tracing::info!(
            "Job {} completed: {} processed, {} written",
            report.job,
            report.processed,
            report.written
        );
    } else {
        tracing::warn!(
            "Job {} completed with {} failures: {} processed, {} written",
            report.job,
            report.failures.len(),
            report.processed,
            report.written
        );
    }
}

/// Wait for a ctrl+c or terminate signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use time::macros::{datetime, time};

    use crate::{
        Error,
        engine::Engine,
        schedule::{Cadence, default_schedules},
        test_utils::get_test_connection,
    };

    use super::{Scheduler, next_fire_time};

    fn get_test_engine() -> Engine {
        Engine::new(Arc::new(Mutex::new(get_test_connection())), 1)
    }

    #[test]
    fn rejects_unknown_timezone() {
        let result = Scheduler::new(get_test_engine(), "Not/AZone", default_schedules());

        assert!(matches!(result, Err(Error::InvalidTimezoneError(_))));
    }

    #[tokio::test]
    async fn stops_when_shutdown_completes() {
        let scheduler =
            Scheduler::new(get_test_engine(), "Asia/Bangkok", default_schedules()).unwrap();

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            scheduler.run_until(async {}),
        )
        .await
        .expect("scheduler did not stop");
    }

    #[test]
    fn fire_time_uses_offset_in_force_at_the_fire_time() {
        let cadence = Cadence::Daily { at: time!(09:00) };
        // 13:00 BST on the day before London falls back to GMT.
        let now = datetime!(2025-10-25 12:00 UTC);

        let next = next_fire_time(&cadence, "Europe/London", now).unwrap();

        assert_eq!(next, datetime!(2025-10-26 09:00 UTC));
    }

    #[test]
    fn fire_time_in_fixed_offset_zone() {
        let cadence = Cadence::Daily { at: time!(02:00) };
        let now = datetime!(2025-10-05 12:00 UTC);

        let next = next_fire_time(&cadence, "Asia/Bangkok", now).unwrap();

        assert_eq!(next, datetime!(2025-10-06 02:00 +7));
    }
}
