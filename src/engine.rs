//! The job entry points and the transaction-create path.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use clap::ValueEnum;
use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    balance::recalculate_user_balances,
    budget::{check_budget, list_budgets},
    config::EngineConfig,
    db::{initialize, lock_connection},
    fan_out::fan_out,
    goal::{check_goal, list_goals},
    notification::{Notification, clean_up_notifications},
    transaction::{Transaction, TransactionBuilder, check_transaction, create_transaction},
    user::{adjust_user_balance, list_user_ids},
};

/// A time-triggered unit of work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    /// Rebuild every user's balance fields from their transactions.
    RecalculateBalances,
    /// Alert on budgets that are at least 80% spent.
    CheckBudgetAlerts,
    /// Alert on goals that are behind their expected pace.
    CheckGoalProgress,
    /// Delete notifications older than the retention period.
    CleanupNotifications,
}

impl Job {
    /// Every job, in declaration order.
    pub const ALL: [Job; 4] = [
        Job::RecalculateBalances,
        Job::CheckBudgetAlerts,
        Job::CheckGoalProgress,
        Job::CleanupNotifications,
    ];

    /// The job's name as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::RecalculateBalances => "recalculate-balances",
            Job::CheckBudgetAlerts => "check-budget-alerts",
            Job::CheckGoalProgress => "check-goal-progress",
            Job::CleanupNotifications => "cleanup-notifications",
        }
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record that a job could not process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    /// Identifies the record, e.g. "user 3" or "budget 12".
    pub key: String,
    /// Why the record failed.
    pub error: String,
}

/// The outcome of one job run.
///
/// A run with failures still completed: every record that could be processed was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    /// The job that ran.
    pub job: Job,
    /// How many records the job looked at.
    pub processed: usize,
    /// How many writes the job made: balances updated, notifications emitted or deleted.
    pub written: usize,
    /// The records that failed.
    pub failures: Vec<JobFailure>,
}

impl JobReport {
    fn new(job: Job) -> Self {
        Self {
            job,
            processed: 0,
            written: 0,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, key: String, error: &Error) {
        tracing::error!("Job {} failed for {key}: {error}", self.job);

        self.failures.push(JobFailure {
            key,
            error: error.to_string(),
        });
    }
}

/// Runs jobs against a shared ledger store.
///
/// Cloning an engine is cheap and the clones share the store and the per-job guards.
#[derive(Debug, Clone)]
pub struct Engine {
    db_connection: Arc<Mutex<Connection>>,
    concurrency: usize,
    guards: Arc<[tokio::sync::Mutex<()>; 4]>,
}

impl Engine {
    /// Create an engine over an already initialized database.
    pub fn new(db_connection: Arc<Mutex<Connection>>, concurrency: usize) -> Self {
        Self {
            db_connection,
            concurrency: concurrency.max(1),
            guards: Arc::new(Default::default()),
        }
    }

    /// Validate `config`, open its database and create any missing tables.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the database cannot be opened or initialized.
    pub fn open(config: &EngineConfig) -> Result<Self, Error> {
        config.validate()?;

        let connection = Connection::open(&config.db_path)?;
        initialize(&connection)?;

        Ok(Self::new(
            Arc::new(Mutex::new(connection)),
            config.concurrency,
        ))
    }

    /// The shared database connection.
    pub fn db_connection(&self) -> &Arc<Mutex<Connection>> {
        &self.db_connection
    }

    /// Run `job` as if triggered at `now`.
    ///
    /// Different jobs may run at the same time, but a job cannot overlap with itself.
    ///
    /// # Errors
    /// Returns [Error::JobAlreadyRunning] if `job` is in progress, or an error if the job could
    /// not list the records it works on. Failures of individual records are reported in the
    /// [JobReport] instead.
    pub async fn run(&self, job: Job, now: OffsetDateTime) -> Result<JobReport, Error> {
        let _running = self.guards[job as usize]
            .try_lock()
            .map_err(|_| Error::JobAlreadyRunning(job))?;

        tracing::info!("Starting job {job} at {now}");

        let report = match job {
            Job::RecalculateBalances => self.recalculate_balances(now).await?,
            Job::CheckBudgetAlerts => self.check_budget_alerts(now).await?,
            Job::CheckGoalProgress => self.check_goal_progress(now).await?,
            Job::CleanupNotifications => self.cleanup_notifications(now).await?,
        };

        tracing::info!(
            "Finished job {job}: {} processed, {} written, {} failed",
            report.processed,
            report.written,
            report.failures.len()
        );

        Ok(report)
    }

    /// Write a new transaction, apply it to the owner's running balance and check it for
    /// anomalies.
    ///
    /// The insert and the balance change are committed together. The anomaly check runs
    /// afterwards and its failures are logged rather than returned.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if the owner does not exist, or another error if the transaction
    /// could not be written.
    pub async fn record_transaction(
        &self,
        builder: TransactionBuilder,
        now: OffsetDateTime,
    ) -> Result<Transaction, Error> {
        let transaction = self
            .with_connection(move |connection| {
                let sql_transaction =
                    SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

                let transaction = create_transaction(builder, now, &sql_transaction)?;
                adjust_user_balance(transaction.user_id, transaction.amount, &sql_transaction)?;

                sql_transaction.commit()?;

                Ok(transaction)
            })
            .await?;

        tracing::debug!(
            "Recorded transaction {} for user {}",
            transaction.id,
            transaction.user_id
        );

        self.on_transaction_created(&transaction).await;

        Ok(transaction)
    }

    /// Run the anomaly check for a newly created transaction.
    ///
    /// Returns the emitted notification, if any. Errors are logged and swallowed so that the
    /// write that triggered the check is never affected.
    pub async fn on_transaction_created(&self, transaction: &Transaction) -> Option<Notification> {
        let transaction = transaction.clone();
        let transaction_id = transaction.id;

        let result = self
            .with_connection(move |connection| check_transaction(&transaction, connection))
            .await;

        match result {
            Ok(notification) => notification,
            Err(error) => {
                tracing::error!("Could not check transaction {transaction_id} for anomalies: {error}");
                None
            }
        }
    }

    /// Run `work` against the shared connection on the blocking thread pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
    {
        let db_connection = self.db_connection.clone();

        tokio::task::spawn_blocking(move || {
            let connection = lock_connection(&db_connection);
            work(&*connection)
        })
        .await
        .map_err(|error| Error::TaskFailed(error.to_string()))?
    }

    async fn recalculate_balances(&self, now: OffsetDateTime) -> Result<JobReport, Error> {
        let user_ids = self.with_connection(list_user_ids).await?;
        let items = user_ids.into_iter().map(|id| (id, id)).collect();

        let results = fan_out(
            items,
            self.concurrency,
            self.db_connection.clone(),
            move |user_id, connection| recalculate_user_balances(user_id, now, connection),
        )
        .await;

        let mut report = JobReport::new(Job::RecalculateBalances);

        for (user_id, result) in results {
            report.processed += 1;

            match result {
                Ok(_) => report.written += 1,
                Err(error) => report.record_failure(format!("user {user_id}"), &error),
            }
        }

        Ok(report)
    }

    async fn check_budget_alerts(&self, now: OffsetDateTime) -> Result<JobReport, Error> {
        let budgets = self.with_connection(list_budgets).await?;
        let mut report = JobReport::new(Job::CheckBudgetAlerts);
        let mut items = Vec::with_capacity(budgets.len());

        for (row, budget) in budgets.into_iter().enumerate() {
            match budget {
                Ok(budget) => items.push((budget.id, budget)),
                Err(error) => {
                    report.processed += 1;
                    report.record_failure(format!("budget row {}", row + 1), &error);
                }
            }
        }

        let results = fan_out(
            items,
            self.concurrency,
            self.db_connection.clone(),
            move |budget, connection| check_budget(&budget, now, connection),
        )
        .await;

        for (budget_id, result) in results {
            report.processed += 1;

            match result {
                Ok(Some(_)) => report.written += 1,
                Ok(None) => {}
                Err(error) => report.record_failure(format!("budget {budget_id}"), &error),
            }
        }

        Ok(report)
    }

    async fn check_goal_progress(&self, now: OffsetDateTime) -> Result<JobReport, Error> {
        let goals = self.with_connection(list_goals).await?;
        let mut report = JobReport::new(Job::CheckGoalProgress);
        let mut items = Vec::with_capacity(goals.len());

        for (row, goal) in goals.into_iter().enumerate() {
            match goal {
                Ok(goal) => items.push((goal.id, goal)),
                Err(error) => {
                    report.processed += 1;
                    report.record_failure(format!("goal row {}", row + 1), &error);
                }
            }
        }

        let results = fan_out(
            items,
            self.concurrency,
            self.db_connection.clone(),
            move |goal, connection| check_goal(&goal, now, connection),
        )
        .await;

        for (goal_id, result) in results {
            report.processed += 1;

            match result {
                Ok(Some(_)) => report.written += 1,
                Ok(None) => {}
                Err(error) => report.record_failure(format!("goal {goal_id}"), &error),
            }
        }

        Ok(report)
    }

    async fn cleanup_notifications(&self, now: OffsetDateTime) -> Result<JobReport, Error> {
        let results = fan_out(
            vec![("notifications", ())],
            1,
            self.db_connection.clone(),
            move |_, connection| clean_up_notifications(now, connection),
        )
        .await;

        let mut report = JobReport::new(Job::CleanupNotifications);

        for (_, result) in results {
            // The sweep is all-or-nothing, so a failure fails the whole run.
            let deleted = result?;
            report.processed += deleted;
            report.written += deleted;
        }

        Ok(report)
    }
}


#[cfg(test)]
mod engine_tests {
    use std::sync::{Arc, Mutex};

    use time::{
        Duration,
        macros::{date, datetime},
    };

    use crate::{
        Error,
        budget::{Budget, create_budget, create_budget_table},
        goal::{Goal, create_goal},
        notification::{
            NewNotification, NotificationData, NotificationKind, UnusualTransactionData,
            count_notifications, create_notification, list_notifications_for_user,
        },
        test_utils::{get_test_connection, insert_user},
        transaction::{Transaction, TransactionType, create_transaction},
        user::{UserId, get_user},
    };

    use super::{Engine, Job};

    fn get_test_engine() -> Engine {
        Engine::new(Arc::new(Mutex::new(get_test_connection())), 2)
    }

    fn with_connection<T>(engine: &Engine, f: impl FnOnce(&rusqlite::Connection) -> T) -> T {
        let connection = engine.db_connection().lock().unwrap();
        f(&connection)
    }

    #[tokio::test]
    async fn recalculate_updates_every_user_and_skips_malformed_ledgers() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 19:00 UTC);
        let (good_user, bad_user, empty_user) = with_connection(&engine, |conn| {
            let good_user = insert_user(conn);
            let bad_user = insert_user(conn);
            let empty_user = insert_user(conn);

            create_transaction(
                Transaction::build(good_user, 100.0, TransactionType::Income, "Salary"),
                now - Duration::days(1),
                conn,
            )
            .unwrap();
            create_transaction(
                Transaction::build(good_user, -30.0, TransactionType::Expense, "Food"),
                now - Duration::days(1),
                conn,
            )
            .unwrap();
            conn.execute(
                "INSERT INTO \"transaction\" (user_id, amount, category, type, date, created_at)
                 VALUES (?1, NULL, 'Food', 'expense', '2025-10-05', '2025-10-05T12:00:00Z')",
                (bad_user.as_i64(),),
            )
            .unwrap();

            (good_user, bad_user, empty_user)
        });

        let report = engine.run(Job::RecalculateBalances, now).await.unwrap();

        assert_eq!(report.job, Job::RecalculateBalances);
        assert_eq!(report.processed, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, format!("user {bad_user}"));
        with_connection(&engine, |conn| {
            let good = get_user(good_user, conn).unwrap();
            assert_eq!(good.current_balance, 70.0);
            assert_eq!(good.total_income, 100.0);
            assert_eq!(good.total_expenses, 30.0);
            assert_eq!(good.last_recalculated, Some(now));

            let empty = get_user(empty_user, conn).unwrap();
            assert_eq!(empty.current_balance, 0.0);
            assert_eq!(empty.last_recalculated, Some(now));

            assert_eq!(get_user(bad_user, conn).unwrap().last_recalculated, None);
        });
    }

    #[tokio::test]
    async fn budget_alerts_are_emitted_on_every_run() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-06 02:00 UTC);
        let user_id = with_connection(&engine, |conn| {
            let user_id = insert_user(conn);
            create_budget(Budget::build(user_id, "Food", 1000.0).spent(900.0), now, conn).unwrap();
            create_budget(Budget::build(user_id, "Rent", 1000.0).spent(100.0), now, conn).unwrap();
            user_id
        });

        let first = engine.run(Job::CheckBudgetAlerts, now).await.unwrap();
        let second = engine
            .run(Job::CheckBudgetAlerts, now + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(first.processed, 2);
        assert_eq!(first.written, 1);
        assert_eq!(second.written, 1);
        with_connection(&engine, |conn| {
            let notifications = list_notifications_for_user(user_id, conn).unwrap();
            assert_eq!(notifications.len(), 2);
            assert!(
                notifications
                    .iter()
                    .all(|notification| notification.kind() == NotificationKind::BudgetAlert)
            );
        });
    }

    #[tokio::test]
    async fn budget_job_reports_malformed_rows_and_continues() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-06 02:00 UTC);
        with_connection(&engine, |conn| {
            let user_id = insert_user(conn);
            conn.execute(
                "INSERT INTO budget (user_id, type, amount, spent, created_at, updated_at)
                 VALUES (?1, 'Rent', NULL, 10.0, '2025-10-05T09:00:00Z', '2025-10-05T09:00:00Z')",
                (user_id.as_i64(),),
            )
            .unwrap();
            create_budget(Budget::build(user_id, "Food", 100.0).spent(95.0), now, conn).unwrap();
        });

        let report = engine.run(Job::CheckBudgetAlerts, now).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.written, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "budget row 1");
    }

    #[tokio::test]
    async fn goal_progress_alerts_goals_behind_schedule() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-06 03:00 UTC);
        let user_id = with_connection(&engine, |conn| {
            let user_id = insert_user(conn);
            create_goal(
                Goal::build(user_id, "Behind", 1000.0, now.date() + Duration::days(100))
                    .current_amount(100.0),
                now,
                conn,
            )
            .unwrap();
            create_goal(
                Goal::build(user_id, "On track", 1000.0, now.date() + Duration::days(100))
                    .current_amount(900.0),
                now,
                conn,
            )
            .unwrap();
            create_goal(
                Goal::build(user_id, "Overdue", 1000.0, date!(2025 - 01 - 01)),
                now,
                conn,
            )
            .unwrap();
            create_goal(
                Goal::build(user_id, "Broken", 0.0, date!(2026 - 01 - 01)),
                now,
                conn,
            )
            .unwrap();
            user_id
        });

        let report = engine.run(Job::CheckGoalProgress, now).await.unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.written, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "goal 4");
        with_connection(&engine, |conn| {
            let notifications = list_notifications_for_user(user_id, conn).unwrap();
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].kind(), NotificationKind::GoalProgress);
        });
    }

    #[tokio::test]
    async fn cleanup_deletes_only_expired_notifications() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 20:00 UTC);
        with_connection(&engine, |conn| {
            let user_id = insert_user(conn);
            for created_at in [
                now - Duration::days(45),
                now - Duration::days(31),
                now - Duration::days(2),
            ] {
                create_notification(
                    NewNotification {
                        user_id,
                        title: "Unusual Transaction Detected".to_owned(),
                        message: "test".to_owned(),
                        data: NotificationData::UnusualTransaction(UnusualTransactionData {
                            transaction_id: 1,
                            amount: 25.0,
                            category: "Food".to_owned(),
                            kind: TransactionType::Expense,
                            average: 10.0,
                        }),
                    },
                    created_at,
                    conn,
                )
                .unwrap();
            }
        });

        let report = engine.run(Job::CleanupNotifications, now).await.unwrap();

        assert_eq!(report.written, 2);
        assert!(report.failures.is_empty());
        with_connection(&engine, |conn| {
            assert_eq!(count_notifications(conn), Ok(1));
        });
    }

    #[tokio::test]
    async fn rejects_overlapping_run_of_the_same_job() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 19:00 UTC);
        let _held = engine.guards[Job::RecalculateBalances as usize]
            .try_lock()
            .unwrap();

        let overlapping = engine.run(Job::RecalculateBalances, now).await;
        let other_job = engine.run(Job::CheckBudgetAlerts, now).await;

        assert_eq!(
            overlapping,
            Err(Error::JobAlreadyRunning(Job::RecalculateBalances))
        );
        assert!(other_job.is_ok());
    }

    #[tokio::test]
    async fn listing_failure_fails_the_whole_run_and_releases_the_guard() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-06 02:00 UTC);
        with_connection(&engine, |conn| {
            let user_id = insert_user(conn);
            create_budget(Budget::build(user_id, "Food", 100.0).spent(95.0), now, conn).unwrap();
            conn.execute("DROP TABLE budget", ()).unwrap();
        });

        let result = engine.run(Job::CheckBudgetAlerts, now).await;

        assert!(matches!(result, Err(Error::SqlError(_))), "got {result:?}");
        with_connection(&engine, |conn| {
            create_budget_table(conn).unwrap();
            assert_eq!(count_notifications(conn), Ok(0));
        });
        let report = engine.run(Job::CheckBudgetAlerts, now).await.unwrap();
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn panic_while_holding_the_connection_does_not_disable_later_jobs() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 19:00 UTC);
        let user_id = with_connection(&engine, insert_user);
        let connection = engine.db_connection().clone();
        let _ = std::thread::spawn(move || {
            let _connection = connection.lock().unwrap();
            panic!("boom");
        })
        .join();
        assert!(engine.db_connection().is_poisoned());

        let report = engine.run(Job::RecalculateBalances, now).await.unwrap();

        assert_eq!(report.written, 1);
        assert!(report.failures.is_empty());
        with_connection(&engine, |conn| {
            assert_eq!(get_user(user_id, conn).unwrap().last_recalculated, Some(now));
        });
    }

    #[tokio::test]
    async fn guard_is_released_after_a_run() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 19:00 UTC);

        engine.run(Job::RecalculateBalances, now).await.unwrap();

        assert!(engine.run(Job::RecalculateBalances, now).await.is_ok());
    }

    #[tokio::test]
    async fn record_transaction_updates_balance_and_flags_unusual_amounts() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 12:00 UTC);
        let user_id = with_connection(&engine, insert_user);

        for minutes in 0..5 {
            engine
                .record_transaction(
                    Transaction::build(user_id, -10.0, TransactionType::Expense, "Food"),
                    now + Duration::minutes(minutes),
                )
                .await
                .unwrap();
        }
        let unusual = engine
            .record_transaction(
                Transaction::build(user_id, -25.0, TransactionType::Expense, "Food"),
                now + Duration::minutes(10),
            )
            .await
            .unwrap();

        with_connection(&engine, |conn| {
            assert_eq!(get_user(user_id, conn).unwrap().current_balance, -75.0);

            let notifications = list_notifications_for_user(user_id, conn).unwrap();
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].kind(), NotificationKind::UnusualTransaction);
            match &notifications[0].data {
                NotificationData::UnusualTransaction(data) => {
                    assert_eq!(data.transaction_id, unusual.id);
                    assert_eq!(data.average, 10.0);
                }
                other => panic!("unexpected payload {other:?}"),
            }
        });
    }

    #[tokio::test]
    async fn record_transaction_for_unknown_user_writes_nothing() {
        let engine = get_test_engine();

        let result = engine
            .record_transaction(
                Transaction::build(UserId::new(99), -10.0, TransactionType::Expense, "Food"),
                datetime!(2025-10-05 12:00 UTC),
            )
            .await;

        assert_eq!(result, Err(Error::NotFound));
    }

    #[tokio::test]
    async fn anomaly_check_failure_is_swallowed() {
        let engine = get_test_engine();
        let now = datetime!(2025-10-05 12:00 UTC);
        let user_id = with_connection(&engine, |conn| {
            let user_id = insert_user(conn);
            for minutes in 0..3 {
                create_transaction(
                    Transaction::build(user_id, -10.0, TransactionType::Expense, "Food"),
                    now + Duration::minutes(minutes),
                    conn,
                )
                .unwrap();
            }
            conn.execute("DROP TABLE notification", ()).unwrap();
            user_id
        });

        let transaction = engine
            .record_transaction(
                Transaction::build(user_id, -500.0, TransactionType::Expense, "Food"),
                now + Duration::minutes(10),
            )
            .await;

        assert!(transaction.is_ok());
    }
}
