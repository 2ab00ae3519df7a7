//! Purges notifications once they are older than the retention horizon.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use time::{Duration, OffsetDateTime};

use crate::{Error, database_id::NotificationId, db::utc};

/// How long a notification is kept before the retention sweep removes it.
pub const NOTIFICATION_RETENTION: Duration = Duration::days(30);

/// Delete every notification, for every user, created strictly before `now - 30 days`.
///
/// Returns the number of notifications removed.
///
/// # Errors
/// Returns an error if the sweep fails, in which case no notification has been removed.
pub fn clean_up_notifications(now: OffsetDateTime, connection: &Connection) -> Result<usize, Error> {
    let cutoff = now - NOTIFICATION_RETENTION;

    let removed = delete_notifications_before(cutoff, connection)?;
    tracing::info!("Cleaned up {removed} old notifications");

    Ok(removed)
}

/// Delete every notification created strictly before `cutoff` as one atomic batch.
///
/// Either all matched notifications are removed or, if any deletion fails, none are.
///
/// # Errors
/// Returns an error if the matching notifications cannot be found or any of them cannot be
/// deleted.
pub fn delete_notifications_before(
    cutoff: OffsetDateTime,
    connection: &Connection,
) -> Result<usize, Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let expired_ids = transaction
        .prepare("SELECT id FROM notification WHERE created_at < :cutoff ORDER BY id")?
        .query_map(&[(":cutoff", &utc(cutoff))], |row| row.get(0))?
        .collect::<Result<Vec<NotificationId>, rusqlite::Error>>()?;

    {
        let mut delete_statement = transaction.prepare("DELETE FROM notification WHERE id = ?1")?;
        for id in &expired_ids {
            delete_statement.execute((id,))?;
        }
    }

    // Dropping the transaction without committing rolls back any deletions made above.
    transaction.commit()?;

    tracing::debug!("Deleted notifications {expired_ids:?}");

    Ok(expired_ids.len())
}
