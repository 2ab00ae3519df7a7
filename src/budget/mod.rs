//! Budgets and the evaluator that alerts users when a budget is nearly used up.

mod alert;
mod core;

pub use alert::{BUDGET_ALERT_THRESHOLD, budget_percentage, check_budget};
pub use core::{
    Budget, BudgetBuilder, create_budget, create_budget_table, list_budgets, list_budgets_for_user,
};
