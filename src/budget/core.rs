//! Defines the budget model and its database queries.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, database_id::BudgetId, db::utc, user::UserId};

/// A spending limit for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The user that owns the budget.
    pub user_id: UserId,
    /// The category the budget covers, e.g. "Food".
    #[serde(rename = "type")]
    pub category: String,
    /// The spending limit.
    pub amount: f64,
    /// The running total spent against the limit. Defaults to zero.
    pub spent: f64,
    /// When the budget was created.
    pub created_at: OffsetDateTime,
    /// When the budget was last changed.
    pub updated_at: OffsetDateTime,
}

impl Budget {
    /// Create a new budget.
    ///
    /// Shortcut for [BudgetBuilder] for discoverability.
    pub fn build(user_id: UserId, category: &str, amount: f64) -> BudgetBuilder {
        BudgetBuilder {
            user_id,
            category: category.to_owned(),
            amount,
            spent: 0.0,
        }
    }
}

/// A builder for creating [Budget] instances.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetBuilder {
    /// The user that will own the budget.
    pub user_id: UserId,
    /// The category the budget covers.
    pub category: String,
    /// The spending limit.
    pub amount: f64,
    /// The amount already spent.
    pub spent: f64,
}

impl BudgetBuilder {
    /// Set the amount already spent against the budget.
    pub fn spent(mut self, spent: f64) -> Self {
        self.spent = spent;
        self
    }
}

/// Create the budget table.
///
/// `amount` and `spent` are nullable since budgets written by other clients may omit them.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                amount REAL,
                spent REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

/// Create a new budget in the database.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the builder's user does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_budget(
    builder: BudgetBuilder,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<Budget, Error> {
    let created_at = utc(created_at);

    connection
        .prepare(
            "INSERT INTO budget (user_id, type, amount, spent, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING id, user_id, type, amount, spent, created_at, updated_at",
        )?
        .query_row(
            (
                builder.user_id.as_i64(),
                &builder.category,
                builder.amount,
                builder.spent,
                created_at,
            ),
            map_budget_row,
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

/// Get every budget for every user.
///
/// Each row is returned as its own result so that one malformed budget does not hide the rest.
///
/// # Errors
/// Returns an error if the query itself cannot be run.
pub fn list_budgets(connection: &Connection) -> Result<Vec<Result<Budget, Error>>, Error> {
    let budgets = connection
        .prepare(
            "SELECT id, user_id, type, amount, spent, created_at, updated_at
             FROM budget ORDER BY id",
        )?
        .query_map([], map_budget_row)?
        .map(|maybe_budget| maybe_budget.map_err(Error::from))
        .collect();

    Ok(budgets)
}

/// Get the budgets owned by `user_id`.
///
/// # Errors
/// Returns an error if the query fails or any of the user's budgets cannot be read.
pub fn list_budgets_for_user(user_id: UserId, connection: &Connection) -> Result<Vec<Budget>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, type, amount, spent, created_at, updated_at
             FROM budget WHERE user_id = :user_id ORDER BY id",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_budget_row)?
        .map(|maybe_budget| maybe_budget.map_err(Error::from))
        .collect()
}

fn map_budget_row(row: &Row) -> Result<Budget, rusqlite::Error> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        category: row.get(2)?,
        amount: row.get(3)?,
        spent: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
