use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use ledger_engine::{
    Budget, Goal, Transaction, TransactionType, create_budget, create_goal, create_transaction,
    create_user, initialize_db,
};

/// A utility for creating a test database for ledger_engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test user...");
    let user = create_user(&conn)?;
    let now = OffsetDateTime::now_utc();

    println!("Creating transactions...");
    for days_ago in (1..=60).rev() {
        let created_at = now - Duration::days(days_ago);

        if days_ago % 30 == 0 {
            create_transaction(
                Transaction::build(user.id, 3000.0, TransactionType::Income, "Salary"),
                created_at,
                &conn,
            )?;
        }

        create_transaction(
            Transaction::build(user.id, -12.5, TransactionType::Expense, "Food"),
            created_at,
            &conn,
        )?;
    }
    // Large enough to stand out against the daily food spend.
    create_transaction(
        Transaction::build(user.id, -480.0, TransactionType::Expense, "Food"),
        now,
        &conn,
    )?;

    println!("Creating budgets...");
    create_budget(Budget::build(user.id, "Food", 400.0).spent(375.0), now, &conn)?;
    create_budget(Budget::build(user.id, "Transport", 200.0).spent(40.0), now, &conn)?;

    println!("Creating goals...");
    create_goal(
        Goal::build(user.id, "Emergency fund", 10000.0, (now + Duration::days(120)).date())
            .current_amount(500.0),
        now,
        &conn,
    )?;
    create_goal(
        Goal::build(user.id, "Holiday", 1500.0, (now + Duration::days(30)).date())
            .current_amount(1400.0),
        now,
        &conn,
    )?;

    println!("Success!");

    Ok(())
}
