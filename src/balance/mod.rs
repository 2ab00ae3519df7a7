//! Rebuilds each user's balance fields from their full transaction ledger.

mod recalculate;

pub use recalculate::{BalanceTotals, recalculate_user_balances, recompute};
