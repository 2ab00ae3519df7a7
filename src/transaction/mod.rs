//! Transactions in the ledger.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing and querying transactions
//! - The anomaly detector that inspects each newly created transaction
//! - Per-category spending and income summaries

mod anomaly;
mod core;
mod query;
mod summary;

pub use anomaly::{ANOMALY_HISTORY_LIMIT, ANOMALY_MULTIPLIER, check_transaction, detect_anomaly};
pub use core::{
    Transaction, TransactionBuilder, TransactionType, create_transaction, create_transaction_table,
    get_transaction,
};
pub use query::{SortOrder, TransactionQuery, list_transactions};
pub use summary::{CategorySummary, summarize_by_category};
