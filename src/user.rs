//! Code for creating the user table and reading and writing users' balance fields.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, balance::BalanceTotals, db::utc};

/// A newtype wrapper for integer user IDs.
///
/// The user ID is the owner key of every other record in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct UserId(i64);

impl UserId {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application and their derived balance fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserId,
    /// The sum of all of the user's transaction amounts.
    pub current_balance: f64,
    /// The sum of the user's positive transaction amounts.
    pub total_income: f64,
    /// The sum of the absolute values of the user's negative transaction amounts.
    pub total_expenses: f64,
    /// When the balance fields were last rebuilt from the full ledger.
    pub last_recalculated: Option<OffsetDateTime>,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                current_balance REAL NOT NULL DEFAULT 0,
                total_income REAL NOT NULL DEFAULT 0,
                total_expenses REAL NOT NULL DEFAULT 0,
                last_recalculated TEXT
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user with zero balances into the database.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn create_user(connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "INSERT INTO user DEFAULT VALUES
             RETURNING id, current_balance, total_income, total_expenses, last_recalculated",
        )?
        .query_row([], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user(user_id: UserId, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "SELECT id, current_balance, total_income, total_expenses, last_recalculated
             FROM user WHERE id = :id",
        )?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the IDs of every user in the database in ascending order.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn list_user_ids(connection: &Connection) -> Result<Vec<UserId>, Error> {
    connection
        .prepare("SELECT id FROM user ORDER BY id")?
        .query_map([], |row| row.get(0).map(UserId::new))?
        .map(|maybe_id| maybe_id.map_err(Error::from))
        .collect()
}

/// Overwrite the balance fields of `user_id` with `totals` and stamp them with `recalculated_at`.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, or [Error::SqlError] if an SQL related
/// error occurred.
pub fn update_user_balances(
    user_id: UserId,
    totals: &BalanceTotals,
    recalculated_at: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user
         SET current_balance = ?1, total_income = ?2, total_expenses = ?3, last_recalculated = ?4
         WHERE id = ?5",
        (
            totals.current_balance,
            totals.total_income,
            totals.total_expenses,
            utc(recalculated_at),
            user_id.as_i64(),
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Add `delta` to the current balance of `user_id`.
///
/// This is the incremental update applied when a transaction is recorded. The income and expense
/// totals are left for the next full recalculation.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, or [Error::SqlError] if an SQL related
/// error occurred.
pub fn adjust_user_balance(user_id: UserId, delta: f64, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET current_balance = current_balance + ?1 WHERE id = ?2",
        (delta, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: UserId::new(row.get(0)?),
        current_balance: row.get(1)?,
        total_income: row.get(2)?,
        total_expenses: row.get(3)?,
        last_recalculated: row.get(4)?,
    })
}
