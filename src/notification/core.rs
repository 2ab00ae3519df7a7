//! Defines the notification record, its typed payloads, and the write that persists them.

use std::fmt::Display;

use rusqlite::{
    Connection, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    Error,
    database_id::{GoalId, NotificationId, TransactionId},
    db::utc,
    transaction::TransactionType,
    user::UserId,
};

/// The type tag stored with each notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A budget is at or above its alert threshold.
    BudgetAlert,
    /// A goal is behind its expected pace.
    GoalProgress,
    /// A transaction is much larger than the owner's recent history.
    UnusualTransaction,
}

impl NotificationKind {
    /// The tag as it is persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BudgetAlert => "budget_alert",
            NotificationKind::GoalProgress => "goal_progress",
            NotificationKind::UnusualTransaction => "unusual_transaction",
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "budget_alert" => Ok(NotificationKind::BudgetAlert),
            "goal_progress" => Ok(NotificationKind::GoalProgress),
            "unusual_transaction" => Ok(NotificationKind::UnusualTransaction),
            other => Err(FromSqlError::Other(
                format!("unknown notification type \"{other}\"").into(),
            )),
        }
    }
}

/// The payload of a `budget_alert` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlertData {
    /// The budget's category.
    #[serde(rename = "budgetType")]
    pub budget_type: String,
    /// How much of the budget has been spent, as a percentage.
    pub percentage: f64,
    /// The budget limit.
    pub amount: f64,
    /// The amount spent so far.
    pub spent: f64,
}

/// The payload of a `goal_progress` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgressData {
    /// The goal that is behind schedule.
    #[serde(rename = "goalId")]
    pub goal_id: GoalId,
    /// Progress towards the target, as a percentage.
    pub progress: f64,
    /// Whole days until the target date, rounded up.
    #[serde(rename = "daysRemaining")]
    pub days_remaining: i64,
    /// The goal's target amount.
    pub target_amount: f64,
    /// The amount saved so far.
    pub current_amount: f64,
}

/// The payload of an `unusual_transaction` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusualTransactionData {
    /// The transaction that was flagged.
    #[serde(rename = "transactionId")]
    pub transaction_id: TransactionId,
    /// The signed transaction amount.
    pub amount: f64,
    /// The transaction's category.
    pub category: String,
    /// The transaction's type.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The average magnitude of the owner's recent transactions of the same type.
    pub average: f64,
}

/// The structured payload of a notification.
///
/// The variant decides the notification's type tag, so a record cannot carry a payload that
/// disagrees with its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NotificationData {
    /// See [BudgetAlertData].
    BudgetAlert(BudgetAlertData),
    /// See [GoalProgressData].
    GoalProgress(GoalProgressData),
    /// See [UnusualTransactionData].
    UnusualTransaction(UnusualTransactionData),
}

impl NotificationData {
    /// The type tag that goes with this payload.
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationData::BudgetAlert(_) => NotificationKind::BudgetAlert,
            NotificationData::GoalProgress(_) => NotificationKind::GoalProgress,
            NotificationData::UnusualTransaction(_) => NotificationKind::UnusualTransaction,
        }
    }

    fn from_json(kind: NotificationKind, json: &str) -> Result<Self, Error> {
        let data = match kind {
            NotificationKind::BudgetAlert => {
                NotificationData::BudgetAlert(serde_json::from_str(json)?)
            }
            NotificationKind::GoalProgress => {
                NotificationData::GoalProgress(serde_json::from_str(json)?)
            }
            NotificationKind::UnusualTransaction => {
                NotificationData::UnusualTransaction(serde_json::from_str(json)?)
            }
        };

        Ok(data)
    }
}

/// A notification that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    /// The user the notification is for.
    pub user_id: UserId,
    /// A short heading, e.g. "Budget Alert".
    pub title: String,
    /// The human-readable message.
    pub message: String,
    /// The structured payload, which also determines the type tag.
    pub data: NotificationData,
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// The ID of the notification.
    pub id: NotificationId,
    /// The user the notification is for.
    pub user_id: UserId,
    /// A short heading.
    pub title: String,
    /// The human-readable message.
    pub message: String,
    /// The structured payload.
    pub data: NotificationData,
    /// When the notification was written.
    pub created_at: OffsetDateTime,
    /// Whether the user has seen the notification.
    pub read: bool,
}

impl Notification {
    /// The notification's type tag.
    pub fn kind(&self) -> NotificationKind {
        self.data.kind()
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let created_at = self
            .created_at
            .format(&Rfc3339)
            .map_err(serde::ser::Error::custom)?;

        let mut state = serializer.serialize_struct("Notification", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("userId", &self.user_id)?;
        state.serialize_field("type", &self.kind())?;
        state.serialize_field("title", &self.title)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("data", &self.data)?;
        state.serialize_field("createdAt", &created_at)?;
        state.serialize_field("read", &self.read)?;
        state.end()
    }
}

/// Create the notification table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_notification_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS notification (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_notification_created_at ON notification(created_at);",
        (),
    )?;

    Ok(())
}

/// Persist `notification` as unread with the creation time `created_at`.
///
/// Every call writes exactly one new record; existing records are never updated or merged.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the notification's user does not exist,
/// - [Error::JSONSerializationError] if the payload cannot be serialized,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_notification(
    notification: NewNotification,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<Notification, Error> {
    let created_at = utc(created_at);
    let data_json = serde_json::to_string(&notification.data)?;

    connection
        .execute(
            "INSERT INTO notification (user_id, type, title, message, data, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            (
                notification.user_id.as_i64(),
                notification.data.kind(),
                &notification.title,
                &notification.message,
                &data_json,
                created_at,
            ),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    Ok(Notification {
        id: connection.last_insert_rowid(),
        user_id: notification.user_id,
        title: notification.title,
        message: notification.message,
        data: notification.data,
        created_at,
        read: false,
    })
}

/// Get the notifications for `user_id`, oldest first.
///
/// # Errors
/// Returns an error if a record cannot be read or its payload cannot be parsed.
pub fn list_notifications_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Notification>, Error> {
    let mut statement = connection.prepare(
        "SELECT id, user_id, type, title, message, data, created_at, read
         FROM notification WHERE user_id = :user_id
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = statement.query_map(&[(":user_id", &user_id.as_i64())], |row| {
        Ok((
            row.get::<_, NotificationId>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, NotificationKind>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, OffsetDateTime>(6)?,
            row.get::<_, bool>(7)?,
        ))
    })?;

    rows.map(|row| -> Result<Notification, Error> {
        let (id, user_id, kind, title, message, data_json, created_at, read) = row?;

        Ok(Notification {
            id,
            user_id: UserId::new(user_id),
            title,
            message,
            data: NotificationData::from_json(kind, &data_json)?,
            created_at,
            read,
        })
    })
    .collect()
}

/// Get the total number of notifications across all users.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_notifications(connection: &Connection) -> Result<usize, Error> {
    let count: i64 =
        connection.query_row("SELECT COUNT(id) FROM notification;", [], |row| row.get(0))?;

    usize::try_from(count)
        .map_err(|error| Error::MalformedRecord(format!("notification count {count}: {error}")))
}
