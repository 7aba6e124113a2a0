//! Error types for miner-db

use miner_core::MinerError;

/// Errors raised by the store
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Write-lock contention that outlived the retry budget
    #[error("Database busy during {operation}, gave up after {attempts} attempts")]
    Contention { operation: String, attempts: u32 },

    #[error("SQLite error during {operation}: {source}")]
    Sqlite {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Line set codec error: {0}")]
    Codec(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub(crate) fn sqlite(operation: &str, source: rusqlite::Error) -> Self {
        DbError::Sqlite {
            operation: operation.to_string(),
            source,
        }
    }
}

impl From<DbError> for MinerError {
    fn from(err: DbError) -> Self {
        MinerError::PersistenceFailure(err.to_string())
    }
}
