//! Ledger Engine derives balances and alerts from a personal finance ledger.
//!
//! The engine is a set of jobs that run against a SQLite ledger store:
//! - a balance recalculator that rebuilds each user's totals from their transactions,
//! - budget and goal evaluators that emit notifications when a threshold is crossed,
//! - an anomaly detector that flags unusual transactions as they are created,
//! - and a retention cleaner that purges old notifications.
//!
//! Jobs are started by the [Scheduler] on a calendar cadence, or directly through [Engine::run].

#![warn(missing_docs)]

mod balance;
mod budget;
mod config;
mod database_id;
mod db;
mod engine;
mod fan_out;
mod goal;
mod logging;
mod notification;
mod schedule;
mod scheduler;
mod timezone;
mod transaction;
mod user;

#[cfg(test)]
mod test_utils;

pub use balance::{BalanceTotals, recalculate_user_balances, recompute};
pub use budget::{
    BUDGET_ALERT_THRESHOLD, Budget, BudgetBuilder, budget_percentage, check_budget, create_budget,
    list_budgets, list_budgets_for_user,
};
pub use config::{DEFAULT_CONCURRENCY, DEFAULT_TIMEZONE, EngineConfig};
pub use database_id::{BudgetId, DatabaseId, GoalId, NotificationId, TransactionId};
pub use db::initialize as initialize_db;
pub use engine::{Engine, Job, JobFailure, JobReport};
pub use goal::{
    Goal, GoalBuilder, GoalPace, PACE_HORIZON_DAYS, check_goal, create_goal, evaluate_pace,
    list_goals, list_goals_for_user,
};
pub use logging::setup_logging;
pub use notification::{
    BudgetAlertData, GoalProgressData, NOTIFICATION_RETENTION, NewNotification, Notification,
    NotificationData, NotificationKind, UnusualTransactionData, clean_up_notifications,
    count_notifications, create_notification, delete_notifications_before,
    list_notifications_for_user,
};
pub use schedule::{Cadence, JobSchedule, default_schedules};
pub use scheduler::{Scheduler, shutdown_signal};
pub use timezone::get_offset_at;
pub use transaction::{
    ANOMALY_HISTORY_LIMIT, ANOMALY_MULTIPLIER, CategorySummary, SortOrder, Transaction,
    TransactionBuilder, TransactionQuery, TransactionType, check_transaction, create_transaction,
    detect_anomaly, get_transaction, list_transactions, summarize_by_category,
};
pub use user::{User, UserId, adjust_user_balance, create_user, get_user, list_user_ids};

/// The errors that may occur in the engine.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested record was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing or deserializing a notification payload.
    #[error("could not (de)serialize JSON: {0}")]
    JSONSerializationError(String),

    /// A stored record is missing a required field, e.g. a transaction with no amount.
    ///
    /// Jobs treat this as a failure of the single record and carry on with the rest.
    #[error("the field \"{0}\" is missing from the stored record")]
    MissingField(String),

    /// A stored record has a value that cannot be used, e.g. an unknown transaction type.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A job was triggered while a previous run of the same job was still in progress.
    #[error("the job \"{0}\" is already running")]
    JobAlreadyRunning(Job),

    /// A background task panicked or was cancelled before it could report a result.
    #[error("a background task failed: {0}")]
    TaskFailed(String),

    /// The engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            rusqlite::Error::InvalidColumnType(_, name, rusqlite::types::Type::Null) => {
                Error::MissingField(name)
            }
            rusqlite::Error::FromSqlConversionFailure(index, _, error) => {
                Error::MalformedRecord(format!("column {index}: {error}"))
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}
