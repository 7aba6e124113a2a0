//! Miner DB - SQLite persistence for mined history
//!
//! Every worker opens its own [`Store`] handle on the same database file.
//! Writes are idempotent (`INSERT OR IGNORE` against unique keys) and every
//! statement runs under a bounded busy-retry, so concurrent ingestion and
//! attribution runs converge on the same rows.

mod database;
mod error;
pub mod lines;
mod retry;
mod schema;

pub use database::{BlameShare, NewBlame, NewCommit, Store, StoreOptions, TableCounts};
pub use error::{DbError, DbResult};
pub use retry::{is_busy, with_retry, RetryPolicy};
