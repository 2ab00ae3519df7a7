//! Filtered reads of a user's transactions.

use std::ops::RangeInclusive;

use rusqlite::{Connection, ToSql, params_from_iter};
use time::Date;

use crate::{Error, database_id::TransactionId, user::UserId};

use super::core::{Transaction, TransactionType, map_transaction_row};

/// Defines how transactions should be fetched by [list_transactions].
#[derive(Debug, Default, Clone)]
pub struct TransactionQuery {
    /// Only include transactions of this type.
    pub kind: Option<TransactionType>,
    /// Include transactions whose calendar date falls within `date_range` (inclusive).
    pub date_range: Option<RangeInclusive<Date>>,
    /// Only include transactions written to the store before the transaction with this ID.
    ///
    /// IDs are assigned in insertion order, so this selects the ledger as it stood just before
    /// that transaction was written, whatever creation times later writes carry.
    pub inserted_before: Option<TransactionId>,
    /// Orders transactions by creation time. None returns transactions in the order they are
    /// stored.
    pub sort_created: Option<SortOrder>,
    /// Selects up to the first N (`limit`) transactions.
    pub limit: Option<u64>,
}

/// The order to sort transactions in a [TransactionQuery].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in order of increasing value.
    Ascending,
    /// Sort in order of decreasing value.
    Descending,
}

/// Retrieve the transactions owned by `user_id` in the way defined by `query`.
///
/// # Errors
/// Returns [Error::MissingField] or [Error::MalformedRecord] if any matching row cannot be read,
/// or [Error::SqlError] if there is some other SQL error.
pub fn list_transactions(
    user_id: UserId,
    query: TransactionQuery,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut query_string_parts = vec![
        "SELECT id, user_id, amount, category, type, date, created_at FROM \"transaction\""
            .to_string(),
    ];
    let mut where_clause_parts = vec!["user_id = ?1".to_string()];
    let mut query_parameters: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.as_i64())];

    if let Some(kind) = query.kind {
        query_parameters.push(Box::new(kind));
        where_clause_parts.push(format!("type = ?{}", query_parameters.len()));
    }

    if let Some(date_range) = query.date_range {
        where_clause_parts.push(format!(
            "date BETWEEN ?{} AND ?{}",
            query_parameters.len() + 1,
            query_parameters.len() + 2,
        ));
        query_parameters.push(Box::new(*date_range.start()));
        query_parameters.push(Box::new(*date_range.end()));
    }

    if let Some(inserted_before) = query.inserted_before {
        query_parameters.push(Box::new(inserted_before));
        where_clause_parts.push(format!("id < ?{}", query_parameters.len()));
    }

    query_string_parts.push(String::from("WHERE ") + &where_clause_parts.join(" AND "));

    // Ties on the timestamp fall back to the ID so that insertion order decides.
    match query.sort_created {
        Some(SortOrder::Ascending) => {
            query_string_parts.push("ORDER BY created_at ASC, id ASC".to_string())
        }
        Some(SortOrder::Descending) => {
            query_string_parts.push("ORDER BY created_at DESC, id DESC".to_string())
        }
        None => {}
    }

    if let Some(limit) = query.limit {
        query_string_parts.push(format!("LIMIT {limit}"));
    }

    let query_string = query_string_parts.join(" ");

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters.iter()), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}
