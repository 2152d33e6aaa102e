//! Connection handling for the `SQLite` row store.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires the connection lock, recovering from poison.
///
/// A panic while holding the lock leaves the connection itself usable, so
/// the poison is logged and cleared rather than propagated.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, `NORMAL` sync and a 5 s busy timeout.
///
/// In-memory databases ignore the journal mode.
pub fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Converts an id or timestamp to the signed column type.
pub fn to_sql_int(name: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("{name} {value} does not fit in a SQLite integer")))
}

/// Maps a `rusqlite` error to [`Error::OperationFailed`].
pub fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::operation(operation, e)
}
