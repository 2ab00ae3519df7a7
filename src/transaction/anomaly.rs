//! Flags newly created transactions that are much larger than the owner's recent history.

use rusqlite::Connection;

use crate::{
    Error,
    notification::{NewNotification, Notification, NotificationData, UnusualTransactionData, create_notification},
};

use super::{
    core::Transaction,
    query::{SortOrder, TransactionQuery, list_transactions},
};

/// How many of the owner's most recent same-type transactions form the baseline.
pub const ANOMALY_HISTORY_LIMIT: u64 = 10;

/// A transaction is unusual when its magnitude exceeds this multiple of the baseline average.
pub const ANOMALY_MULTIPLIER: f64 = 2.0;

/// Decide whether `amount` is unusual compared to `recent_amounts`.
///
/// Returns the average magnitude of `recent_amounts` when `amount` is unusual, and `None`
/// otherwise. An empty history is never unusual.
pub fn detect_anomaly(amount: f64, recent_amounts: &[f64]) -> Option<f64> {
    if recent_amounts.is_empty() {
        return None;
    }

    let total: f64 = recent_amounts.iter().map(|amount| amount.abs()).sum();
    let average = total / recent_amounts.len() as f64;

    (amount.abs() > average * ANOMALY_MULTIPLIER).then_some(average)
}

/// Check a newly created transaction against its owner's history and emit an
/// `unusual_transaction` notification if it stands out.
///
/// The history is the owner's latest [ANOMALY_HISTORY_LIMIT] transactions of the same type that
/// were written before `transaction`. Transactions written after it are ignored even when they
/// carry an earlier or equal creation time.
///
/// Returns the emitted notification, if any.
///
/// # Errors
/// Returns an error if the history cannot be read or the notification cannot be written.
pub fn check_transaction(
    transaction: &Transaction,
    connection: &Connection,
) -> Result<Option<Notification>, Error> {
    let recent = list_transactions(
        transaction.user_id,
        TransactionQuery {
            kind: Some(transaction.kind),
            inserted_before: Some(transaction.id),
            sort_created: Some(SortOrder::Descending),
            limit: Some(ANOMALY_HISTORY_LIMIT),
            ..Default::default()
        },
        connection,
    )?;
    let recent_amounts: Vec<f64> = recent.iter().map(|recent| recent.amount).collect();

    let Some(average) = detect_anomaly(transaction.amount, &recent_amounts) else {
        tracing::debug!(
            "Transaction {} for user {} is within the usual range",
            transaction.id,
            transaction.user_id
        );
        return Ok(None);
    };

    let notification = create_notification(
        NewNotification {
            user_id: transaction.user_id,
            title: "Unusual Transaction Detected".to_owned(),
            message: format!(
                "A {} of {} in {} seems unusual compared to your average",
                transaction.kind,
                transaction.amount.abs(),
                transaction.category
            ),
            data: NotificationData::UnusualTransaction(UnusualTransactionData {
                transaction_id: transaction.id,
                amount: transaction.amount,
                category: transaction.category.clone(),
                kind: transaction.kind,
                average,
            }),
        },
        transaction.created_at,
        connection,
    )?;

    tracing::info!("Unusual transaction alert sent for user {}", transaction.user_id);

    Ok(Some(notification))
}
