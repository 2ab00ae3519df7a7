//! Runs a unit of database work per key on a bounded pool of blocking tasks.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use rusqlite::Connection;
use tokio::{
    sync::Semaphore,
    task::{Id, JoinSet},
};

use crate::{Error, db::lock_connection};

/// Run `work` once for every `(key, item)` pair, with at most `concurrency` units in flight.
///
/// Each unit holds the database lock for its whole read, compute and write, so no two units
/// interleave their statements. A unit that fails, or whose task panics, is reported against its
/// key and does not stop the others: the lock poisoned by a panic is recovered by the next unit.
///
/// Results are returned sorted by key.
pub(crate) async fn fan_out<K, I, T, F>(
    items: Vec<(K, I)>,
    concurrency: usize,
    db_connection: Arc<Mutex<Connection>>,
    work: F,
) -> Vec<(K, Result<T, Error>)>
where
    K: Ord + Clone + Send + 'static,
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I, &Connection) -> Result<T, Error> + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let work = Arc::new(work);
    let mut tasks = JoinSet::new();
    let mut keys_by_task: HashMap<Id, K> = HashMap::new();
    let mut results = Vec::with_capacity(items.len());

    for (key, item) in items {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(error) => {
                results.push((key, Err(Error::TaskFailed(error.to_string()))));
                continue;
            }
        };

        let db_connection = db_connection.clone();
        let work = work.clone();
        let task_key = key.clone();

        let handle = tasks.spawn_blocking(move || {
            let _permit = permit;
            let connection = lock_connection(&db_connection);

            work(item, &*connection)
        });

        keys_by_task.insert(handle.id(), task_key);
    }

    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, result)) => {
                if let Some(key) = keys_by_task.remove(&id) {
                    results.push((key, result));
                }
            }
            Err(error) => {
                tracing::error!("A fan-out task did not finish: {error}");

                if let Some(key) = keys_by_task.remove(&error.id()) {
                    results.push((key, Err(Error::TaskFailed(error.to_string()))));
                }
            }
        }
    }

    results.sort_by(|(a, _), (b, _)| a.cmp(b));
    results
}
