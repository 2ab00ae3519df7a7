//! Compares each goal's progress to a linear one-year pace.

use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use crate::{
    Error,
    notification::{GoalProgressData, NewNotification, Notification, NotificationData, create_notification},
};

use super::core::Goal;

/// The horizon, in days, that every goal is assumed to be paced over.
pub const PACE_HORIZON_DAYS: f64 = 365.0;

/// Where a goal stands relative to its expected pace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalPace {
    /// Progress towards the target, as a percentage.
    pub progress: f64,
    /// Whole days until the target date, rounded up. Zero or negative once the date has passed.
    pub days_remaining: i64,
    /// The percentage the goal is expected to be at: `days_remaining / 365 * 100`.
    pub expected_pace: f64,
}

impl GoalPace {
    /// Whether the goal should be alerted as behind schedule.
    ///
    /// Goals at or past their target date are never behind.
    pub fn is_behind(&self) -> bool {
        self.days_remaining > 0 && self.progress < self.expected_pace
    }
}

/// Work out the progress and expected pace of `goal` at `now`.
///
/// The target date is taken as midnight UTC at the start of that day.
///
/// # Errors
/// Returns [Error::MalformedRecord] if the goal's target amount is not positive.
pub fn evaluate_pace(goal: &Goal, now: OffsetDateTime) -> Result<GoalPace, Error> {
    if goal.target_amount <= 0.0 {
        return Err(Error::MalformedRecord(format!(
            "goal {} has a target amount of {}",
            goal.id, goal.target_amount
        )));
    }

    let progress = goal.current_amount / goal.target_amount * 100.0;

    let target = goal.target_date.midnight().assume_utc();
    let days_remaining =
        ((target - now).as_seconds_f64() / Duration::DAY.as_seconds_f64()).ceil() as i64;

    let expected_pace = days_remaining as f64 / PACE_HORIZON_DAYS * 100.0;

    Ok(GoalPace {
        progress,
        days_remaining,
        expected_pace,
    })
}

/// Emit a `goal_progress` notification for `goal` if it is behind its expected pace.
///
/// No record is kept of earlier alerts, so a goal that stays behind is alerted on every run.
///
/// # Errors
/// Returns an error if the goal is malformed or the notification cannot be written.
pub fn check_goal(
    goal: &Goal,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Option<Notification>, Error> {
    let pace = evaluate_pace(goal, now)?;

    if !pace.is_behind() {
        return Ok(None);
    }

    let notification = create_notification(
        NewNotification {
            user_id: goal.user_id,
            title: "Goal Progress Alert".to_owned(),
            message: format!(
                "Your goal \"{}\" is behind schedule. Current progress: {:.1}%",
                goal.title, pace.progress
            ),
            data: NotificationData::GoalProgress(GoalProgressData {
                goal_id: goal.id,
                progress: pace.progress,
                days_remaining: pace.days_remaining,
                target_amount: goal.target_amount,
                current_amount: goal.current_amount,
            }),
        },
        now,
        connection,
    )?;

    tracing::info!(
        "Goal progress alert sent for user {}, goal: {}",
        goal.user_id,
        goal.title
    );

    Ok(Some(notification))
}
