use std::{error::Error, path::PathBuf};

use clap::Parser;

use ledger_engine::{
    DEFAULT_CONCURRENCY, DEFAULT_TIMEZONE, Engine, EngineConfig, Scheduler, default_schedules,
    setup_logging, shutdown_signal,
};

/// The long-running job scheduler for ledger_engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the ledger SQLite database.
    #[arg(long)]
    db_path: PathBuf,

    /// The IANA timezone that job schedules are evaluated in.
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// The maximum number of records a job works on at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// File path to write debug logs to.
    #[arg(long, default_value = "debug.log")]
    log_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    setup_logging(&args.log_path)?;

    let config = EngineConfig {
        db_path: args.db_path,
        timezone: args.timezone,
        concurrency: args.concurrency,
    };
    let engine = Engine::open(&config)?;
    let scheduler = Scheduler::new(engine, &config.timezone, default_schedules())?;

    tracing::info!(
        "Ledger engine running against {:#?} in {}",
        config.db_path,
        config.timezone
    );
    scheduler.run_until(shutdown_signal()).await;

    Ok(())
}
