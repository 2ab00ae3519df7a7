//! Folds a user's transactions into their balance, income and expense totals.

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    transaction::{Transaction, TransactionQuery, list_transactions},
    user::{UserId, update_user_balances},
};

/// The derived balance fields of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTotals {
    /// The sum of every transaction amount.
    pub current_balance: f64,
    /// The sum of the positive transaction amounts.
    pub total_income: f64,
    /// The sum of the absolute values of the negative transaction amounts.
    pub total_expenses: f64,
}

/// Compute the balance totals of `transactions` from scratch.
///
/// Zero amounts count towards neither income nor expenses.
pub fn recompute(transactions: &[Transaction]) -> BalanceTotals {
    transactions
        .iter()
        .fold(BalanceTotals::default(), |mut totals, transaction| {
            let amount = transaction.amount;

            totals.current_balance += amount;

            if amount > 0.0 {
                totals.total_income += amount;
            } else if amount < 0.0 {
                totals.total_expenses += amount.abs();
            }

            totals
        })
}

/// Read every transaction of `user_id`, recompute the user's totals and overwrite the stored
/// balance fields, stamping them with `now`.
///
/// The read and the write happen on the same connection, so the caller should hold the
/// connection for the whole call to avoid computing against a half-updated ledger.
///
/// # Errors
/// Returns an error if the transactions cannot be read (including a malformed transaction) or the
/// user cannot be updated. In either case the stored balances are left unchanged.
pub fn recalculate_user_balances(
    user_id: UserId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<BalanceTotals, Error> {
    let transactions = list_transactions(user_id, TransactionQuery::default(), connection)?;
    let totals = recompute(&transactions);

    update_user_balances(user_id, &totals, now, connection)?;

    tracing::info!(
        "Updated balances for user {user_id}: {}",
        totals.current_balance
    );

    Ok(totals)
}
