//! Busy-retry wrapper around SQLite operations

use crate::error::{DbError, DbResult};
use rusqlite::ErrorCode;
use serde::Deserialize;
use std::time::Duration;

/// Bounded retry policy for write-lock contention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Fixed sleep between attempts, in milliseconds
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Returns true for errors caused by another connection holding the lock
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Runs `op`, retrying on busy/locked errors.
///
/// Any other error is returned on the spot. Once `max_attempts` busy
/// failures have been seen the operation fails with `DbError::Contention`.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation: &str, mut op: F) -> DbResult<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_busy(&e) => {
                if attempt >= max_attempts {
                    return Err(DbError::Contention {
                        operation: operation.to_string(),
                        attempts: attempt,
                    });
                }
                log::debug!(
                    "Database busy during {}, retrying... (attempt {}/{})",
                    operation,
                    attempt,
                    max_attempts
                );
                std::thread::sleep(policy.backoff());
            }
            Err(e) => return Err(DbError::sqlite(operation, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn busy() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY), None)
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, backoff_ms: 1 }
    }

    #[test]
    fn test_succeeds_after_transient_busy() {
        let calls = Cell::new(0);
        let result = with_retry(&fast(5), "test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(busy()) } else { Ok(7) }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: DbResult<()> = with_retry(&fast(4), "test", || {
            calls.set(calls.get() + 1);
            Err(busy())
        });
        assert!(matches!(result, Err(DbError::Contention { attempts: 4, .. })));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: DbResult<()> = with_retry(&fast(4), "test", || {
            calls.set(calls.get() + 1);
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(matches!(result, Err(DbError::Sqlite { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_locked_counts_as_busy() {
        let locked = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(is_busy(&locked));
        assert!(!is_busy(&rusqlite::Error::QueryReturnedNoRows));
    }
}
