//! Runtime settings for the engine and its scheduler.

use std::path::PathBuf;

use time::OffsetDateTime;

use crate::{Error, timezone::get_offset_at};

/// The timezone that job schedules are evaluated in unless configured otherwise.
pub const DEFAULT_TIMEZONE: &str = "Asia/Bangkok";

/// The number of users or records a job processes at the same time unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Settings for running the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// File path to the SQLite ledger database.
    pub db_path: PathBuf,
    /// The canonical timezone name, e.g. "Asia/Bangkok", that schedules fire in.
    pub timezone: String,
    /// The maximum number of records a job works on concurrently.
    pub concurrency: usize,
}

impl EngineConfig {
    /// Create a config for the database at `db_path` with the default timezone and concurrency.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            timezone: DEFAULT_TIMEZONE.to_owned(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Check that the timezone is known and the concurrency is usable.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] for an unknown timezone or [Error::InvalidConfig] for
    /// a concurrency of zero.
    pub fn validate(&self) -> Result<(), Error> {
        get_offset_at(&self.timezone, OffsetDateTime::now_utc())?;

        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }
}
