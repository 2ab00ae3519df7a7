//! Notification records: the shared sink for every alert the engine raises, and the retention
//! sweep that eventually removes them.

mod core;
mod retention;

pub use core::{
    BudgetAlertData, GoalProgressData, NewNotification, Notification, NotificationData,
    NotificationKind, UnusualTransactionData, count_notifications, create_notification,
    create_notification_table, list_notifications_for_user,
};
pub use retention::{NOTIFICATION_RETENTION, clean_up_notifications, delete_notifications_before};
