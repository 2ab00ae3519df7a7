//! Savings goals and the evaluator that warns when a goal falls behind pace.

mod core;
mod progress;

pub use core::{Goal, GoalBuilder, create_goal, create_goal_table, list_goals, list_goals_for_user};
pub use progress::{GoalPace, PACE_HORIZON_DAYS, check_goal, evaluate_pace};
