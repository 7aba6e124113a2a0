//! Command implementations

mod attribute;
mod history;
mod ingest;
mod owned;
mod stats;

pub use attribute::cmd_attribute;
pub use history::cmd_history;
pub use ingest::cmd_ingest;
pub use owned::cmd_owned;
pub use stats::cmd_stats;
