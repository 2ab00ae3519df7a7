//! Defines the financial goal model and its database queries.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Error, database_id::GoalId, db::utc, user::UserId};

/// An amount of money a user wants to have saved by a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// The ID of the goal.
    pub id: GoalId,
    /// The user that owns the goal.
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// A short name for the goal, e.g. "Emergency fund".
    pub title: String,
    /// The amount to save. Always greater than zero for a usable goal.
    pub target_amount: f64,
    /// The amount saved so far.
    pub current_amount: f64,
    /// The date the goal should be reached by.
    pub target_date: Date,
}

impl Goal {
    /// Create a new goal.
    ///
    /// Shortcut for [GoalBuilder] for discoverability.
    pub fn build(user_id: UserId, title: &str, target_amount: f64, target_date: Date) -> GoalBuilder {
        GoalBuilder {
            user_id,
            title: title.to_owned(),
            target_amount,
            current_amount: 0.0,
            target_date,
        }
    }
}

/// A builder for creating [Goal] instances.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalBuilder {
    /// The user that will own the goal.
    pub user_id: UserId,
    /// A short name for the goal.
    pub title: String,
    /// The amount to save.
    pub target_amount: f64,
    /// The amount already saved.
    pub current_amount: f64,
    /// The date the goal should be reached by.
    pub target_date: Date,
}

impl GoalBuilder {
    /// Set the amount already saved towards the goal.
    pub fn current_amount(mut self, current_amount: f64) -> Self {
        self.current_amount = current_amount;
        self
    }
}

/// Create the goal table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_goal_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS goal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                target_amount REAL,
                current_amount REAL,
                target_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

/// Create a new goal in the database.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the builder's user does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_goal(
    builder: GoalBuilder,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<Goal, Error> {
    connection
        .prepare(
            "INSERT INTO goal (user_id, title, target_amount, current_amount, target_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, user_id, title, target_amount, current_amount, target_date",
        )?
        .query_row(
            (
                builder.user_id.as_i64(),
                &builder.title,
                builder.target_amount,
                builder.current_amount,
                builder.target_date,
                utc(created_at),
            ),
            map_goal_row,
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
        })
}

/// Get every goal for every user.
///
/// Each row is returned as its own result so that one malformed goal does not hide the rest.
///
/// # Errors
/// Returns an error if the query itself cannot be run.
pub fn list_goals(connection: &Connection) -> Result<Vec<Result<Goal, Error>>, Error> {
    let goals = connection
        .prepare(
            "SELECT id, user_id, title, target_amount, current_amount, target_date
             FROM goal ORDER BY id",
        )?
        .query_map([], map_goal_row)?
        .map(|maybe_goal| maybe_goal.map_err(Error::from))
        .collect();

    Ok(goals)
}

/// Get the goals owned by `user_id`.
///
/// # Errors
/// Returns an error if the query fails or any of the user's goals cannot be read.
pub fn list_goals_for_user(user_id: UserId, connection: &Connection) -> Result<Vec<Goal>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, title, target_amount, current_amount, target_date
             FROM goal WHERE user_id = :user_id ORDER BY id",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_goal_row)?
        .map(|maybe_goal| maybe_goal.map_err(Error::from))
        .collect()
}

fn map_goal_row(row: &Row) -> Result<Goal, rusqlite::Error> {
    Ok(Goal {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        title: row.get(2)?,
        target_amount: row.get(3)?,
        current_amount: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        target_date: row.get(5)?,
    })
}
