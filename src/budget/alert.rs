//! Compares each budget's spending to its limit.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    notification::{BudgetAlertData, NewNotification, Notification, NotificationData, create_notification},
};

use super::core::Budget;

/// A budget is alerted once this percentage of it has been spent (inclusive).
pub const BUDGET_ALERT_THRESHOLD: f64 = 80.0;

/// The percentage of `amount` that `spent` represents, or `None` when the budget has no limit to
/// measure against.
///
/// The percentage may exceed 100.
pub fn budget_percentage(spent: f64, amount: f64) -> Option<f64> {
    if amount <= 0.0 {
        return None;
    }

    Some(spent / amount * 100.0)
}

/// Emit a `budget_alert` notification for `budget` if it is at or above
/// [BUDGET_ALERT_THRESHOLD].
///
/// No record is kept of earlier alerts, so a budget that stays above the threshold is alerted on
/// every run.
///
/// # Errors
/// Returns an error if the notification cannot be written.
pub fn check_budget(
    budget: &Budget,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Option<Notification>, Error> {
    let Some(percentage) = budget_percentage(budget.spent, budget.amount) else {
        tracing::warn!(
            "Skipping budget {} for user {}: the budget amount is {}",
            budget.id,
            budget.user_id,
            budget.amount
        );
        return Ok(None);
    };

    if percentage < BUDGET_ALERT_THRESHOLD {
        return Ok(None);
    }

    let notification = create_notification(
        NewNotification {
            user_id: budget.user_id,
            title: "Budget Alert".to_owned(),
            message: format!(
                "Your {} budget is {:.1}% used ({}/{})",
                budget.category, percentage, budget.spent, budget.amount
            ),
            data: NotificationData::BudgetAlert(BudgetAlertData {
                budget_type: budget.category.clone(),
                percentage,
                amount: budget.amount,
                spent: budget.spent,
            }),
        },
        now,
        connection,
    )?;

    tracing::info!(
        "Budget alert sent for user {}, {} budget",
        budget.user_id,
        budget.category
    );

    Ok(Some(notification))
}


#[cfg(test)]
mod check_budget_tests {
    use time::macros::datetime;

    use crate::{
        budget::{Budget, create_budget},
        notification::{NotificationData, NotificationKind},
        test_utils::{get_test_connection, insert_user},
    };

    use super::check_budget;

    #[test]
    fn alerts_at_exactly_eighty_percent() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);
        let now = datetime!(2025-10-05 09:00 UTC);
        let budget =
            create_budget(Budget::build(user_id, "Food", 1000.0).spent(800.0), now, &conn).unwrap();

        let notification = check_budget(&budget, now, &conn)
            .unwrap()
            .expect("expected a budget alert");

        assert_eq!(notification.kind(), NotificationKind::BudgetAlert);
        assert_eq!(notification.title, "Budget Alert");
        assert_eq!(notification.message, "Your Food budget is 80.0% used (800/1000)");
        assert_eq!(notification.created_at, now);
        match notification.data {
            NotificationData::BudgetAlert(data) => {
                assert_eq!(data.budget_type, "Food");
                assert_eq!(data.percentage, 80.0);
                assert_eq!(data.amount, 1000.0);
                assert_eq!(data.spent, 800.0);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn does_not_alert_below_eighty_percent() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);
        let now = datetime!(2025-10-05 09:00 UTC);
        let budget =
            create_budget(Budget::build(user_id, "Food", 1000.0).spent(799.0), now, &conn).unwrap();

        assert_eq!(check_budget(&budget, now, &conn), Ok(None));
    }

    #[test]
    fn does_not_alert_on_zero_amount() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);
        let now = datetime!(2025-10-05 09:00 UTC);
        let budget =
            create_budget(Budget::build(user_id, "Food", 0.0).spent(50.0), now, &conn).unwrap();

        assert_eq!(check_budget(&budget, now, &conn), Ok(None));
    }

    #[test]
    fn reports_percentage_to_one_decimal_place() {
        let conn = get_test_connection();
        let user_id = insert_user(&conn);
        let now = datetime!(2025-10-05 09:00 UTC);
        let budget =
            create_budget(Budget::build(user_id, "Rent", 300.0).spent(250.0), now, &conn).unwrap();

        let notification = check_budget(&budget, now, &conn).unwrap().unwrap();

        assert_eq!(notification.message, "Your Rent budget is 83.3% used (250/300)");
    }
}
