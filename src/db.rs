/*! Sets up the ledger store's tables and holds helpers shared by the store functions. */

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use time::{OffsetDateTime, UtcOffset};

use crate::{
    Error, budget::create_budget_table, goal::create_goal_table,
    notification::create_notification_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Create all of the ledger tables if they do not exist yet.
///
/// The tables are created in a single exclusive transaction, so either every table exists
/// afterwards or none of the new ones do.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_budget_table(&transaction)?;
    create_goal_table(&transaction)?;
    create_notification_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Normalise a timestamp to UTC before it is written.
///
/// Timestamps are compared as text in SQL, which only orders correctly when every stored value
/// shares the same offset.
pub(crate) fn utc(timestamp: OffsetDateTime) -> OffsetDateTime {
    timestamp.to_offset(UtcOffset::UTC)
}

/// Lock the shared connection, recovering it if an earlier holder panicked.
///
/// A panic inside a unit of work unwinds through any open SQL transaction, which rolls it back,
/// so the connection itself is still usable afterwards.
pub(crate) fn lock_connection(db_connection: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match db_connection.lock() {
        Ok(connection) => connection,
        Err(poisoned) => {
            tracing::warn!("Recovering the database connection after a panicked task");
            db_connection.clear_poison();
            poisoned.into_inner()
        }
    }
}
