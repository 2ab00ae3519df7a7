//! Per-category totals of a user's income or spending.

use std::{collections::BTreeMap, ops::RangeInclusive};

use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::{Error, user::UserId};

use super::{
    core::{Transaction, TransactionType},
    query::{TransactionQuery, list_transactions},
};

/// Totals of one transaction type grouped by category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    /// The transaction type that was summarised.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The total for each category, ordered by category name.
    pub by_category: BTreeMap<String, f64>,
    /// The sum over all categories.
    pub total: f64,
    /// The number of transactions that went into the summary.
    pub transaction_count: usize,
}

/// Summarise the transactions of `user_id` of type `kind`, optionally within `date_range`.
///
/// Expenses are summed by magnitude; income is summed as recorded.
///
/// # Errors
/// Returns an error if the transactions cannot be read.
pub fn summarize_by_category(
    user_id: UserId,
    kind: TransactionType,
    date_range: Option<RangeInclusive<Date>>,
    connection: &Connection,
) -> Result<CategorySummary, Error> {
    let transactions = list_transactions(
        user_id,
        TransactionQuery {
            kind: Some(kind),
            date_range,
            ..Default::default()
        },
        connection,
    )?;

    Ok(group_by_category(kind, &transactions))
}

fn group_by_category(kind: TransactionType, transactions: &[Transaction]) -> CategorySummary {
    let mut by_category = BTreeMap::new();
    let mut total = 0.0;

    for transaction in transactions {
        let amount = match kind {
            TransactionType::Expense => transaction.amount.abs(),
            TransactionType::Income => transaction.amount,
        };

        *by_category
            .entry(transaction.category.clone())
            .or_insert(0.0) += amount;
        total += amount;
    }

    CategorySummary {
        kind,
        by_category,
        total,
        transaction_count: transactions.len(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use crate::{
        test_utils::{get_test_connection, insert_user},
        transaction::{Transaction, TransactionType, create_transaction},
    };

    use super::summarize_by_category;

    #[test]
    fn sums_expenses_by_magnitude_per_category() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);
        let now = datetime!(2025-10-05 12:00 UTC);
        for (amount, category) in [(-10.0, "Food"), (-5.5, "Food"), (-20.0, "Transport")] {
            create_transaction(
                Transaction::build(user_id, amount, TransactionType::Expense, category),
                now,
                &conn,
            )
            .unwrap();
        }
        create_transaction(
            Transaction::build(user_id, 1000.0, TransactionType::Income, "Salary"),
            now,
            &conn,
        )
        .unwrap();

        let summary =
            summarize_by_category(user_id, TransactionType::Expense, None, &conn).unwrap();

        assert_eq!(summary.by_category["Food"], 15.5);
        assert_eq!(summary.by_category["Transport"], 20.0);
        assert_eq!(summary.total, 35.5);
        assert_eq!(summary.transaction_count, 3);
    }

    #[test]
    fn respects_date_range() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);
        let now = datetime!(2025-10-05 12:00 UTC);
        create_transaction(
            Transaction::build(user_id, 100.0, TransactionType::Income, "Salary")
                .date(date!(2025 - 09 - 01)),
            now,
            &conn,
        )
        .unwrap();
        create_transaction(
            Transaction::build(user_id, 50.0, TransactionType::Income, "Allowance")
                .date(date!(2025 - 10 - 01)),
            now,
            &conn,
        )
        .unwrap();

        let summary = summarize_by_category(
            user_id,
            TransactionType::Income,
            Some(date!(2025 - 10 - 01)..=date!(2025 - 10 - 31)),
            &conn,
        )
        .unwrap();

        assert_eq!(summary.total, 50.0);
        assert_eq!(summary.by_category.len(), 1);
    }

    #[test]
    fn empty_ledger_gives_empty_summary() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);

        let summary =
            summarize_by_category(user_id, TransactionType::Income, None, &conn).unwrap();

        assert!(summary.by_category.is_empty());
        assert_eq!(summary.total, 0.0);
        assert_eq!(summary.transaction_count, 0);
    }
}
